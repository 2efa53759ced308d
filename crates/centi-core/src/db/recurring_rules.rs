//! Recurring rule repository implementation

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // SQLite stores i64

use std::str::FromStr;

use libsql::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{Frequency, RecurringRule};
use crate::util::unix_timestamp_millis;

/// Trait for recurring rule storage operations
#[allow(async_fn_in_trait)]
pub trait RecurringRuleRepository {
    /// Insert a new rule
    async fn create(&self, record: RecurringRule) -> Result<RecurringRule>;

    /// Get a rule by id, including tombstoned rows
    async fn get(&self, id: &str) -> Result<Option<RecurringRule>>;

    /// Update a rule, bumping `updated_at`
    async fn update(&self, record: &RecurringRule) -> Result<RecurringRule>;

    /// Soft delete (tombstone) a rule
    async fn soft_delete(&self, id: &str) -> Result<()>;

    /// Clear a tombstone, bumping `updated_at`
    async fn restore(&self, id: &str) -> Result<()>;

    /// List live rules
    async fn list_active(&self) -> Result<Vec<RecurringRule>>;

    /// Active, non-tombstoned rules due at or before `now_ms`
    async fn list_due(&self, now_ms: i64) -> Result<Vec<RecurringRule>>;

    /// List every row including tombstones (sync/merge input)
    async fn list_all(&self) -> Result<Vec<RecurringRule>>;

    /// Upsert a batch verbatim in one transaction (merge application)
    async fn put_many(&self, records: &[RecurringRule]) -> Result<()>;

    /// Hard-delete tombstones older than `cutoff_ms`
    async fn purge_expired(&self, cutoff_ms: i64) -> Result<usize>;
}

/// libSQL implementation of `RecurringRuleRepository`
pub struct LibSqlRecurringRuleRepository<'a> {
    conn: &'a Connection,
}

const SELECT_COLUMNS: &str = "id, created_at, updated_at, deleted_at, amount, is_income, is_annual, category_id, description, frequency, day_of_week, day_of_month, month_of_year, next_generation_at, last_generated_at, is_active";

impl<'a> LibSqlRecurringRuleRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_row(row: &libsql::Row) -> Result<RecurringRule> {
        let frequency: String = row.get(9)?;
        Ok(RecurringRule {
            id: row.get(0)?,
            created_at: row.get(1)?,
            updated_at: row.get(2)?,
            deleted_at: row.get(3)?,
            amount: row.get(4)?,
            is_income: row.get::<i32>(5)? != 0,
            is_annual: row.get::<i32>(6)? != 0,
            category_id: row.get(7)?,
            description: row.get(8)?,
            frequency: Frequency::from_str(&frequency).map_err(Error::Database)?,
            day_of_week: row.get::<Option<i64>>(10)?.map(|v| v as u32),
            day_of_month: row.get::<Option<i64>>(11)?.map(|v| v as u32),
            month_of_year: row.get::<Option<i64>>(12)?.map(|v| v as u32),
            next_generation_at: row.get(13)?,
            last_generated_at: row.get(14)?,
            is_active: row.get::<i32>(15)? != 0,
        })
    }

    async fn upsert(&self, record: &RecurringRule) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO recurring_rules
                 (id, created_at, updated_at, deleted_at, amount, is_income, is_annual, category_id,
                  description, frequency, day_of_week, day_of_month, month_of_year,
                  next_generation_at, last_generated_at, is_active)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id.as_str(),
                    record.created_at,
                    record.updated_at,
                    record.deleted_at,
                    record.amount,
                    i64::from(record.is_income),
                    i64::from(record.is_annual),
                    record.category_id.as_deref(),
                    record.description.as_str(),
                    record.frequency.as_str(),
                    record.day_of_week.map(i64::from),
                    record.day_of_month.map(i64::from),
                    record.month_of_year.map(i64::from),
                    record.next_generation_at,
                    record.last_generated_at,
                    i64::from(record.is_active)
                ],
            )
            .await?;
        Ok(())
    }

    async fn query_rows(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<RecurringRule>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_row(&row)?);
        }
        Ok(records)
    }
}

impl RecurringRuleRepository for LibSqlRecurringRuleRepository<'_> {
    async fn create(&self, record: RecurringRule) -> Result<RecurringRule> {
        self.upsert(&record).await?;
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<RecurringRule>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM recurring_rules WHERE id = ?"),
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, record: &RecurringRule) -> Result<RecurringRule> {
        let existing = self
            .get(&record.id)
            .await?
            .ok_or_else(|| Error::NotFound(record.id.clone()))?;

        let updated = RecurringRule {
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
                "UPDATE recurring_rules SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
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
                "UPDATE recurring_rules SET deleted_at = NULL, updated_at = ? WHERE id = ? AND deleted_at IS NOT NULL",
                params![now, id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<RecurringRule>> {
        self.query_rows(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM recurring_rules
                 WHERE deleted_at IS NULL
                 ORDER BY created_at ASC"
            ),
            (),
        )
        .await
    }

    async fn list_due(&self, now_ms: i64) -> Result<Vec<RecurringRule>> {
        self.query_rows(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM recurring_rules
                 WHERE deleted_at IS NULL AND is_active = 1 AND next_generation_at <= ?
                 ORDER BY next_generation_at ASC"
            ),
            params![now_ms],
        )
        .await
    }

    async fn list_all(&self) -> Result<Vec<RecurringRule>> {
        self.query_rows(&format!("SELECT {SELECT_COLUMNS} FROM recurring_rules"), ())
            .await
    }

    async fn put_many(&self, records: &[RecurringRule]) -> Result<()> {
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
                "DELETE FROM recurring_rules WHERE deleted_at IS NOT NULL AND deleted_at < ?",
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
    async fn test_round_trip_with_anchors() {
        let db = setup().await;
        let repo = LibSqlRecurringRuleRepository::new(db.connection());

        let mut rule = RecurringRule::new(
            1200,
            false,
            false,
            Some("c1".to_string()),
            "Rent",
            Frequency::Monthly,
            1_700_000_000_000,
        );
        rule.day_of_month = Some(31);
        let stored = repo.create(rule).await.unwrap();

        let fetched = repo.get(&stored.id).await.unwrap().unwrap();
        assert_eq!(fetched, stored);
        assert_eq!(fetched.day_of_month, Some(31));
        assert_eq!(fetched.frequency, Frequency::Monthly);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_due_filters_inactive_and_future() {
        let db = setup().await;
        let repo = LibSqlRecurringRuleRepository::new(db.connection());

        let due = RecurringRule::new(100, false, false, None, "Due", Frequency::Daily, 1_000);
        let future = RecurringRule::new(
            100,
            false,
            false,
            None,
            "Future",
            Frequency::Daily,
            5_000_000,
        );
        let mut inactive =
            RecurringRule::new(100, false, false, None, "Paused", Frequency::Daily, 1_000);
        inactive.is_active = false;
        let tombstoned =
            RecurringRule::new(100, false, false, None, "Deleted", Frequency::Daily, 1_000);
        let tombstoned_id = tombstoned.id.clone();

        repo.put_many(&[due, future, inactive, tombstoned])
            .await
            .unwrap();
        repo.soft_delete(&tombstoned_id).await.unwrap();

        let due_rules = repo.list_due(2_000).await.unwrap();
        assert_eq!(due_rules.len(), 1);
        assert_eq!(due_rules[0].description, "Due");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_bumps_updated_at_only() {
        let db = setup().await;
        let repo = LibSqlRecurringRuleRepository::new(db.connection());

        let rule = repo
            .create(RecurringRule::new(
                100,
                false,
                false,
                None,
                "Coffee",
                Frequency::Weekly,
                1_000,
            ))
            .await
            .unwrap();

        let mut edited = rule.clone();
        edited.next_generation_at = 2_000;
        edited.last_generated_at = Some(1_500);
        let updated = repo.update(&edited).await.unwrap();

        assert_eq!(updated.next_generation_at, 2_000);
        assert_eq!(updated.created_at, rule.created_at);
        assert!(updated.updated_at >= rule.updated_at);
    }
}
