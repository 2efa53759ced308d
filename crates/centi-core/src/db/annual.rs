//! Annual transaction repository implementation

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // SQLite stores i64

use libsql::{params, Connection};

use crate::error::{Error, Result};
use crate::models::AnnualTransaction;
use crate::util::unix_timestamp_millis;

/// Trait for annual transaction storage operations
#[allow(async_fn_in_trait)]
pub trait AnnualTransactionRepository {
    /// Insert a new annual transaction
    async fn create(&self, record: AnnualTransaction) -> Result<AnnualTransaction>;

    /// Get an annual transaction by id, including tombstoned rows
    async fn get(&self, id: &str) -> Result<Option<AnnualTransaction>>;

    /// Update a record; re-derives the shard year and bumps `updated_at`
    async fn update(&self, record: &AnnualTransaction) -> Result<AnnualTransaction>;

    /// Soft delete (tombstone) a record
    async fn soft_delete(&self, id: &str) -> Result<()>;

    /// Clear a tombstone, bumping `updated_at`
    async fn restore(&self, id: &str) -> Result<()>;

    /// List live records for one year shard
    async fn list_year(&self, year: i32) -> Result<Vec<AnnualTransaction>>;

    /// List all live records
    async fn list_active(&self) -> Result<Vec<AnnualTransaction>>;

    /// List every row including tombstones (sync/merge input)
    async fn list_all(&self) -> Result<Vec<AnnualTransaction>>;

    /// Upsert a batch verbatim in one transaction (merge application)
    async fn put_many(&self, records: &[AnnualTransaction]) -> Result<()>;

    /// Hard-delete tombstones older than `cutoff_ms`
    async fn purge_expired(&self, cutoff_ms: i64) -> Result<usize>;
}

/// libSQL implementation of `AnnualTransactionRepository`
pub struct LibSqlAnnualTransactionRepository<'a> {
    conn: &'a Connection,
}

const SELECT_COLUMNS: &str =
    "id, transacted_at, updated_at, deleted_at, category_id, amount, year, description, is_income";

impl<'a> LibSqlAnnualTransactionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_row(row: &libsql::Row) -> Result<AnnualTransaction> {
        Ok(AnnualTransaction {
            id: row.get(0)?,
            transacted_at: row.get(1)?,
            updated_at: row.get(2)?,
            deleted_at: row.get(3)?,
            category_id: row.get(4)?,
            amount: row.get(5)?,
            year: row.get(6)?,
            description: row.get(7)?,
            is_income: row.get::<i32>(8)? != 0,
        })
    }

    async fn upsert(&self, record: &AnnualTransaction) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO annual_transactions
                 (id, transacted_at, updated_at, deleted_at, category_id, amount, year, description, is_income)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id.as_str(),
                    record.transacted_at,
                    record.updated_at,
                    record.deleted_at,
                    record.category_id.as_deref(),
                    record.amount,
                    i64::from(record.year),
                    record.description.as_str(),
                    i64::from(record.is_income)
                ],
            )
            .await?;
        Ok(())
    }

    async fn query_rows(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<AnnualTransaction>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_row(&row)?);
        }
        Ok(records)
    }
}

impl AnnualTransactionRepository for LibSqlAnnualTransactionRepository<'_> {
    async fn create(&self, record: AnnualTransaction) -> Result<AnnualTransaction> {
        self.upsert(&record).await?;
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<AnnualTransaction>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM annual_transactions WHERE id = ?"),
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, record: &AnnualTransaction) -> Result<AnnualTransaction> {
        let existing = self
            .get(&record.id)
            .await?
            .ok_or_else(|| Error::NotFound(record.id.clone()))?;

        let (year, _) = crate::models::shard_key_of(record.transacted_at);
        let updated = AnnualTransaction {
            id: existing.id,
            deleted_at: existing.deleted_at,
            updated_at: unix_timestamp_millis(),
            year,
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
                "UPDATE annual_transactions SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
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
                "UPDATE annual_transactions SET deleted_at = NULL, updated_at = ? WHERE id = ? AND deleted_at IS NOT NULL",
                params![now, id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_year(&self, year: i32) -> Result<Vec<AnnualTransaction>> {
        self.query_rows(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM annual_transactions
                 WHERE year = ? AND deleted_at IS NULL
                 ORDER BY transacted_at DESC"
            ),
            params![i64::from(year)],
        )
        .await
    }

    async fn list_active(&self) -> Result<Vec<AnnualTransaction>> {
        self.query_rows(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM annual_transactions
                 WHERE deleted_at IS NULL
                 ORDER BY transacted_at DESC"
            ),
            (),
        )
        .await
    }

    async fn list_all(&self) -> Result<Vec<AnnualTransaction>> {
        self.query_rows(
            &format!("SELECT {SELECT_COLUMNS} FROM annual_transactions"),
            (),
        )
        .await
    }

    async fn put_many(&self, records: &[AnnualTransaction]) -> Result<()> {
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
                "DELETE FROM annual_transactions WHERE deleted_at IS NOT NULL AND deleted_at < ?",
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
    async fn test_create_get_and_list_year() {
        let db = setup().await;
        let repo = LibSqlAnnualTransactionRepository::new(db.connection());

        let txn = repo
            .create(AnnualTransaction::new(
                unix_timestamp_millis(),
                2000,
                false,
                None,
                "What Remains of Edith Finch",
            ))
            .await
            .unwrap();

        let fetched = repo.get(&txn.id).await.unwrap().unwrap();
        assert_eq!(fetched, txn);

        let in_year = repo.list_year(txn.year).await.unwrap();
        assert_eq!(in_year.len(), 1);
        assert!(repo.list_year(txn.year - 1).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_soft_delete_hides_from_active() {
        let db = setup().await;
        let repo = LibSqlAnnualTransactionRepository::new(db.connection());

        let txn = repo
            .create(AnnualTransaction::new(
                unix_timestamp_millis(),
                9000,
                false,
                None,
                "Couch",
            ))
            .await
            .unwrap();

        repo.soft_delete(&txn.id).await.unwrap();
        assert!(repo.list_active().await.unwrap().is_empty());
        assert_eq!(repo.list_all().await.unwrap().len(), 1);

        repo.restore(&txn.id).await.unwrap();
        assert_eq!(repo.list_active().await.unwrap().len(), 1);
    }
}
