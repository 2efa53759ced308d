//! Category repository implementation

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // SQLite stores i64

use libsql::{params, Connection};

use crate::error::{Error, Result};
use crate::models::Category;
use crate::util::unix_timestamp_millis;

/// Trait for category storage operations
#[allow(async_fn_in_trait)]
pub trait CategoryRepository {
    /// Insert a new category
    async fn create(&self, record: Category) -> Result<Category>;

    /// Get a category by id, including tombstoned rows
    async fn get(&self, id: &str) -> Result<Option<Category>>;

    /// Update a category, bumping `updated_at`
    async fn update(&self, record: &Category) -> Result<Category>;

    /// Soft delete (tombstone) a category
    async fn soft_delete(&self, id: &str) -> Result<()>;

    /// Clear a tombstone, bumping `updated_at`
    async fn restore(&self, id: &str) -> Result<()>;

    /// List live categories in manual order
    async fn list_active(&self) -> Result<Vec<Category>>;

    /// List every row including tombstones (sync/merge input)
    async fn list_all(&self) -> Result<Vec<Category>>;

    /// Upsert a batch verbatim in one transaction (merge application)
    async fn put_many(&self, records: &[Category]) -> Result<()>;

    /// Hard-delete tombstones older than `cutoff_ms`
    async fn purge_expired(&self, cutoff_ms: i64) -> Result<usize>;
}

/// libSQL implementation of `CategoryRepository`
pub struct LibSqlCategoryRepository<'a> {
    conn: &'a Connection,
}

const SELECT_COLUMNS: &str = "id, created_at, updated_at, deleted_at, name, colour, icon, priority, is_annual_only, is_income_only";

impl<'a> LibSqlCategoryRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_row(row: &libsql::Row) -> Result<Category> {
        Ok(Category {
            id: row.get(0)?,
            created_at: row.get(1)?,
            updated_at: row.get(2)?,
            deleted_at: row.get(3)?,
            name: row.get(4)?,
            colour: row.get(5)?,
            icon: row.get(6)?,
            priority: row.get(7)?,
            is_annual_only: row.get::<i32>(8)? != 0,
            is_income_only: row.get::<i32>(9)? != 0,
        })
    }

    async fn upsert(&self, record: &Category) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO categories
                 (id, created_at, updated_at, deleted_at, name, colour, icon, priority, is_annual_only, is_income_only)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id.as_str(),
                    record.created_at,
                    record.updated_at,
                    record.deleted_at,
                    record.name.as_str(),
                    record.colour.as_str(),
                    record.icon.as_str(),
                    record.priority,
                    i64::from(record.is_annual_only),
                    i64::from(record.is_income_only)
                ],
            )
            .await?;
        Ok(())
    }

    async fn query_rows(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Category>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_row(&row)?);
        }
        Ok(records)
    }
}

impl CategoryRepository for LibSqlCategoryRepository<'_> {
    async fn create(&self, record: Category) -> Result<Category> {
        self.upsert(&record).await?;
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<Category>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM categories WHERE id = ?"),
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, record: &Category) -> Result<Category> {
        let existing = self
            .get(&record.id)
            .await?
            .ok_or_else(|| Error::NotFound(record.id.clone()))?;

        let updated = Category {
            id: existing.id,
            created_at: existing.created_at,
            deleted_at: existing.deleted_at,
            updated_at: unix_timestamp_millis(),
            ..record.clone()
        };
        self.upsert(&updated).await?;
        Ok(updated)
    }

    async fn soft_delete(&self, id: &str) -> Result<()> {
        let now = unix_timestamp_millis();
        let rows = self
            .conn
            .execute(
                "UPDATE categories SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
                params![now, now, id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn restore(&self, id: &str) -> Result<()> {
        let now = unix_timestamp_millis();
        let rows = self
            .conn
            .execute(
                "UPDATE categories SET deleted_at = NULL, updated_at = ? WHERE id = ? AND deleted_at IS NOT NULL",
                params![now, id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<Category>> {
        self.query_rows(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM categories
                 WHERE deleted_at IS NULL
                 ORDER BY priority ASC, created_at ASC"
            ),
            (),
        )
        .await
    }

    async fn list_all(&self) -> Result<Vec<Category>> {
        self.query_rows(&format!("SELECT {SELECT_COLUMNS} FROM categories"), ())
            .await
    }

    async fn put_many(&self, records: &[Category]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        for record in records {
            if let Err(e) = self.upsert(record).await {
                self.conn.execute("ROLLBACK", ()).await.ok();
                return Err(e);
            }
        }
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    async fn purge_expired(&self, cutoff_ms: i64) -> Result<usize> {
        let purged = self
            .conn
            .execute(
                "DELETE FROM categories WHERE deleted_at IS NOT NULL AND deleted_at < ?",
                params![cutoff_ms],
            )
            .await?;
        Ok(purged as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_active_orders_by_priority() {
        let db = setup().await;
        let repo = LibSqlCategoryRepository::new(db.connection());

        repo.create(Category::new("Videogame", "#8b5cf6", "🎮", 2))
            .await
            .unwrap();
        repo.create(Category::new("Food", "#f97316", "🍔", 0))
            .await
            .unwrap();
        repo.create(Category::new("Grocery", "#22c55e", "🛒", 1))
            .await
            .unwrap();

        let names: Vec<String> = repo
            .list_active()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Food", "Grocery", "Videogame"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_preserves_created_at() {
        let db = setup().await;
        let repo = LibSqlCategoryRepository::new(db.connection());

        let category = repo
            .create(Category::new("Food", "#f97316", "🍔", 0))
            .await
            .unwrap();

        let mut edited = category.clone();
        edited.name = "Dining".to_string();
        edited.created_at = 0; // must be ignored
        let updated = repo.update(&edited).await.unwrap();

        assert_eq!(updated.name, "Dining");
        assert_eq!(updated.created_at, category.created_at);
        assert!(updated.updated_at >= category.updated_at);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_gating_flags_round_trip() {
        let db = setup().await;
        let repo = LibSqlCategoryRepository::new(db.connection());

        let mut category = Category::new("Salary", "#0ea5e9", "💰", 3);
        category.is_income_only = true;
        let stored = repo.create(category).await.unwrap();

        let fetched = repo.get(&stored.id).await.unwrap().unwrap();
        assert!(fetched.is_income_only);
        assert!(!fetched.is_annual_only);
    }
}
