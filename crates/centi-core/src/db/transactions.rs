//! Periodic transaction repository implementation

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // SQLite stores i64

use libsql::{params, Connection};

use crate::error::{Error, Result};
use crate::models::Transaction;
use crate::util::unix_timestamp_millis;

/// Trait for periodic transaction storage operations
#[allow(async_fn_in_trait)]
pub trait TransactionRepository {
    /// Insert a new transaction
    async fn create(&self, record: Transaction) -> Result<Transaction>;

    /// Get a transaction by id, including tombstoned rows
    async fn get(&self, id: &str) -> Result<Option<Transaction>>;

    /// Update a transaction; re-derives the shard key and bumps `updated_at`
    async fn update(&self, record: &Transaction) -> Result<Transaction>;

    /// Soft delete (tombstone) a transaction
    async fn soft_delete(&self, id: &str) -> Result<()>;

    /// Clear a tombstone, bumping `updated_at`
    async fn restore(&self, id: &str) -> Result<()>;

    /// List live transactions for one (year, month) shard
    async fn list_month(&self, year: i32, month: u32) -> Result<Vec<Transaction>>;

    /// List all live transactions
    async fn list_active(&self) -> Result<Vec<Transaction>>;

    /// List every row including tombstones (sync/merge input)
    async fn list_all(&self) -> Result<Vec<Transaction>>;

    /// Upsert a batch verbatim in one transaction (merge application)
    async fn put_many(&self, records: &[Transaction]) -> Result<()>;

    /// Hard-delete tombstones older than `cutoff_ms`
    async fn purge_expired(&self, cutoff_ms: i64) -> Result<usize>;
}

/// libSQL implementation of `TransactionRepository`
pub struct LibSqlTransactionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlTransactionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_row(row: &libsql::Row) -> Result<Transaction> {
        Ok(Transaction {
            id: row.get(0)?,
            transacted_at: row.get(1)?,
            updated_at: row.get(2)?,
            deleted_at: row.get(3)?,
            category_id: row.get(4)?,
            amount: row.get(5)?,
            year: row.get(6)?,
            month: row.get::<i64>(7)? as u32,
            description: row.get(8)?,
            is_income: row.get::<i32>(9)? != 0,
        })
    }

    async fn upsert(&self, record: &Transaction) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO transactions
                 (id, transacted_at, updated_at, deleted_at, category_id, amount, year, month, description, is_income)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id.as_str(),
                    record.transacted_at,
                    record.updated_at,
                    record.deleted_at,
                    record.category_id.as_deref(),
                    record.amount,
                    i64::from(record.year),
                    i64::from(record.month),
                    record.description.as_str(),
                    i64::from(record.is_income)
                ],
            )
            .await?;
        Ok(())
    }

    async fn query_rows(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Transaction>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_row(&row)?);
        }
        Ok(records)
    }
}

const SELECT_COLUMNS: &str = "id, transacted_at, updated_at, deleted_at, category_id, amount, year, month, description, is_income";

impl TransactionRepository for LibSqlTransactionRepository<'_> {
    async fn create(&self, record: Transaction) -> Result<Transaction> {
        self.upsert(&record).await?;
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<Transaction>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM transactions WHERE id = ?"),
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, record: &Transaction) -> Result<Transaction> {
        let existing = self
            .get(&record.id)
            .await?
            .ok_or_else(|| Error::NotFound(record.id.clone()))?;

        let (year, month) = crate::models::shard_key_of(record.transacted_at);
        let updated = Transaction {
            id: existing.id,
            deleted_at: existing.deleted_at,
            updated_at: unix_timestamp_millis(),
            year,
            month,
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
                "UPDATE transactions SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
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
                "UPDATE transactions SET deleted_at = NULL, updated_at = ? WHERE id = ? AND deleted_at IS NOT NULL",
                params![now, id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_month(&self, year: i32, month: u32) -> Result<Vec<Transaction>> {
        self.query_rows(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM transactions
                 WHERE year = ? AND month = ? AND deleted_at IS NULL
                 ORDER BY transacted_at DESC"
            ),
            params![i64::from(year), i64::from(month)],
        )
        .await
    }

    async fn list_active(&self) -> Result<Vec<Transaction>> {
        self.query_rows(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM transactions
                 WHERE deleted_at IS NULL
                 ORDER BY transacted_at DESC"
            ),
            (),
        )
        .await
    }

    async fn list_all(&self) -> Result<Vec<Transaction>> {
        self.query_rows(&format!("SELECT {SELECT_COLUMNS} FROM transactions"), ())
            .await
    }

    async fn put_many(&self, records: &[Transaction]) -> Result<()> {
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
                "DELETE FROM transactions WHERE deleted_at IS NOT NULL AND deleted_at < ?",
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
    use crate::models::Transaction;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_and_get() {
        let db = setup().await;
        let repo = LibSqlTransactionRepository::new(db.connection());

        let txn = repo
            .create(Transaction::new(
                unix_timestamp_millis(),
                500,
                false,
                None,
                "Eggs",
            ))
            .await
            .unwrap();

        let fetched = repo.get(&txn.id).await.unwrap().unwrap();
        assert_eq!(fetched, txn);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_rederives_shard_key() {
        let db = setup().await;
        let repo = LibSqlTransactionRepository::new(db.connection());

        // 2024-03-15T00:00:00Z
        let march = 1_710_460_800_000;
        let txn = repo
            .create(Transaction::new(march, 500, false, None, "Eggs"))
            .await
            .unwrap();

        let mut edited = txn.clone();
        // 2024-07-15T00:00:00Z
        edited.transacted_at = 1_721_001_600_000;
        let updated = repo.update(&edited).await.unwrap();

        assert_ne!((updated.year, updated.month), (txn.year, txn.month));
        assert!(updated.updated_at >= txn.updated_at);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_soft_delete_and_restore_round_trip() {
        let db = setup().await;
        let repo = LibSqlTransactionRepository::new(db.connection());

        let txn = repo
            .create(Transaction::new(
                unix_timestamp_millis(),
                1000,
                false,
                None,
                "Sandwich",
            ))
            .await
            .unwrap();

        repo.soft_delete(&txn.id).await.unwrap();
        let deleted = repo.get(&txn.id).await.unwrap().unwrap();
        assert!(deleted.deleted_at.is_some());
        assert!(repo.list_active().await.unwrap().is_empty());

        repo.restore(&txn.id).await.unwrap();
        let restored = repo.get(&txn.id).await.unwrap().unwrap();
        assert!(restored.deleted_at.is_none());
        assert_eq!(restored.amount, txn.amount);
        assert_eq!(restored.description, txn.description);
        assert_eq!(repo.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_many_preserves_timestamps() {
        let db = setup().await;
        let repo = LibSqlTransactionRepository::new(db.connection());

        let mut txn = Transaction::new(unix_timestamp_millis(), 500, false, None, "Eggs");
        txn.updated_at = 42;
        repo.put_many(std::slice::from_ref(&txn)).await.unwrap();

        let stored = repo.get(&txn.id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, 42);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_purge_expired_only_removes_old_tombstones() {
        let db = setup().await;
        let repo = LibSqlTransactionRepository::new(db.connection());

        let mut old = Transaction::new(unix_timestamp_millis(), 100, false, None, "Old");
        old.deleted_at = Some(1_000);
        let mut fresh = Transaction::new(unix_timestamp_millis(), 200, false, None, "Fresh");
        fresh.deleted_at = Some(5_000);
        let live = Transaction::new(unix_timestamp_millis(), 300, false, None, "Live");
        repo.put_many(&[old.clone(), fresh, live]).await.unwrap();

        let purged = repo.purge_expired(2_000).await.unwrap();
        assert_eq!(purged, 1);
        assert!(repo.get(&old.id).await.unwrap().is_none());
        assert_eq!(repo.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_month_filters_shard() {
        let db = setup().await;
        let repo = LibSqlTransactionRepository::new(db.connection());

        // 2024-03-15 and 2024-07-15 (UTC), distinct shard months
        let in_march = Transaction::new(1_710_460_800_000, 500, false, None, "March");
        let in_july = Transaction::new(1_721_001_600_000, 700, false, None, "July");
        let (year, month) = (in_march.year, in_march.month);
        repo.put_many(&[in_march, in_july]).await.unwrap();

        let march_rows = repo.list_month(year, month).await.unwrap();
        assert_eq!(march_rows.len(), 1);
        assert_eq!(march_rows[0].description, "March");
    }
}
