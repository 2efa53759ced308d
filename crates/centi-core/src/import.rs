//! Bulk import
//!
//! Structurally the local half of a sync pass with no remote store: the same
//! newer-timestamp-wins test decides which incoming records apply. Validation
//! is wholesale: a payload that does not parse into typed records is
//! rejected before anything is written.

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::db::{
    AnnualTransactionRepository, CategoryRepository, Database,
    LibSqlAnnualTransactionRepository, LibSqlCategoryRepository, LibSqlRecurringRuleRepository,
    LibSqlSettingsRepository, LibSqlTransactionRepository, RecurringRuleRepository,
    SettingsRepository, TransactionRepository,
};
use crate::models::{
    AnnualTransaction, Category, ProfileSettings, RecurringRule, Syncable, Transaction,
};

/// Import failures surfaced to the UI layer.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The payload is not a well-formed snapshot document; nothing was touched
    #[error("Invalid import payload: {0}")]
    Invalid(String),

    /// Local record store failure
    #[error("Local store error: {0}")]
    Database(#[from] crate::error::Error),
}

/// A parsed snapshot payload awaiting preview or execution.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDocument {
    #[serde(default)]
    pub exported_at: Option<i64>,
    #[serde(default)]
    pub settings: Option<ProfileSettings>,
    pub transactions: Vec<Transaction>,
    pub annual_transactions: Vec<AnnualTransaction>,
    pub categories: Vec<Category>,
    #[serde(default)]
    pub recurring_rules: Vec<RecurringRule>,
}

/// Parse and validate a snapshot payload.
///
/// Every record must carry at least an id and an `updatedAt`; typed
/// deserialization enforces that (and the rest of each record's shape)
/// before any mutation can happen.
pub fn parse_import(payload: &str) -> Result<ImportDocument, ImportError> {
    serde_json::from_str(payload).map_err(|error| ImportError::Invalid(error.to_string()))
}

/// Added/updated counts for one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionCounts {
    /// Records absent locally that would be inserted
    pub added: usize,
    /// Records strictly newer than the local copy that would replace it
    pub updated: usize,
}

/// What an import would change, per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportPreview {
    pub transactions: CollectionCounts,
    pub annual_transactions: CollectionCounts,
    pub categories: CollectionCounts,
    pub recurring_rules: CollectionCounts,
}

impl ImportPreview {
    /// Total records the import would write.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.transactions.added
            + self.transactions.updated
            + self.annual_transactions.added
            + self.annual_transactions.updated
            + self.categories.added
            + self.categories.updated
            + self.recurring_rules.added
            + self.recurring_rules.updated
    }
}

fn count_changes<T: Syncable>(existing: &[T], incoming: &[T]) -> CollectionCounts {
    let mut counts = CollectionCounts::default();
    for record in incoming {
        match existing.iter().find(|held| held.id() == record.id()) {
            None => counts.added += 1,
            Some(held) => {
                if record.updated_at() > held.updated_at() {
                    counts.updated += 1;
                }
            }
        }
    }
    counts
}

fn filter_newer<T: Syncable + Clone>(existing: &[T], incoming: &[T]) -> Vec<T> {
    incoming
        .iter()
        .filter(|record| {
            existing
                .iter()
                .find(|held| held.id() == record.id())
                .is_none_or(|held| record.updated_at() > held.updated_at())
        })
        .cloned()
        .collect()
}

struct ExistingRecords {
    transactions: Vec<Transaction>,
    annual: Vec<AnnualTransaction>,
    categories: Vec<Category>,
    rules: Vec<RecurringRule>,
}

async fn load_existing(db: &Mutex<Database>) -> Result<ExistingRecords, ImportError> {
    let db = db.lock().await;
    let conn = db.connection();
    Ok(ExistingRecords {
        transactions: LibSqlTransactionRepository::new(conn).list_all().await?,
        annual: LibSqlAnnualTransactionRepository::new(conn)
            .list_all()
            .await?,
        categories: LibSqlCategoryRepository::new(conn).list_all().await?,
        rules: LibSqlRecurringRuleRepository::new(conn).list_all().await?,
    })
}

/// Compute what the import would change, without mutating anything.
pub async fn preview_import(
    db: &Mutex<Database>,
    document: &ImportDocument,
) -> Result<ImportPreview, ImportError> {
    let existing = load_existing(db).await?;

    Ok(ImportPreview {
        transactions: count_changes(&existing.transactions, &document.transactions),
        annual_transactions: count_changes(&existing.annual, &document.annual_transactions),
        categories: count_changes(&existing.categories, &document.categories),
        recurring_rules: count_changes(&existing.rules, &document.recurring_rules),
    })
}

/// Apply exactly the records the preview counted.
///
/// Returns the preview computed against the pre-import state, so callers can
/// show "imported N" figures that match what actually happened.
pub async fn execute_import(
    db: &Mutex<Database>,
    document: &ImportDocument,
) -> Result<ImportPreview, ImportError> {
    let existing = load_existing(db).await?;

    let preview = ImportPreview {
        transactions: count_changes(&existing.transactions, &document.transactions),
        annual_transactions: count_changes(&existing.annual, &document.annual_transactions),
        categories: count_changes(&existing.categories, &document.categories),
        recurring_rules: count_changes(&existing.rules, &document.recurring_rules),
    };

    let transactions = filter_newer(&existing.transactions, &document.transactions);
    let annual = filter_newer(&existing.annual, &document.annual_transactions);
    let categories = filter_newer(&existing.categories, &document.categories);
    let rules = filter_newer(&existing.rules, &document.recurring_rules);

    {
        let db = db.lock().await;
        let conn = db.connection();
        LibSqlTransactionRepository::new(conn)
            .put_many(&transactions)
            .await?;
        LibSqlAnnualTransactionRepository::new(conn)
            .put_many(&annual)
            .await?;
        LibSqlCategoryRepository::new(conn)
            .put_many(&categories)
            .await?;
        LibSqlRecurringRuleRepository::new(conn)
            .put_many(&rules)
            .await?;

        if let Some(settings) = &document.settings {
            let repo = LibSqlSettingsRepository::new(conn);
            let held = repo.profile().await?;
            if settings.updated_at > held.updated_at {
                repo.save_profile(settings).await?;
            }
        }
    }

    tracing::info!("Imported {} record(s)", preview.total());
    Ok(preview)
}
