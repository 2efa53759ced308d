//! Snapshot export
//!
//! Bundles every live record across the four collections plus the profile
//! settings into one serializable document. The same document shape is what
//! `import` consumes, so a Centi export restores losslessly on another
//! device.

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::db::{
    AnnualTransactionRepository, CategoryRepository, Database,
    LibSqlAnnualTransactionRepository, LibSqlCategoryRepository, LibSqlRecurringRuleRepository,
    LibSqlSettingsRepository, LibSqlTransactionRepository, RecurringRuleRepository,
    SettingsRepository, TransactionRepository,
};
use crate::error::Result;
use crate::models::{AnnualTransaction, Category, ProfileSettings, RecurringRule, Transaction};
use crate::util::unix_timestamp_millis;

/// A full snapshot of live local data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    /// When the snapshot was taken (Unix ms)
    pub exported_at: i64,
    pub settings: ProfileSettings,
    pub transactions: Vec<Transaction>,
    pub annual_transactions: Vec<AnnualTransaction>,
    pub categories: Vec<Category>,
    pub recurring_rules: Vec<RecurringRule>,
}

/// Snapshot all non-tombstoned records plus settings.
pub async fn build_export(db: &Mutex<Database>) -> Result<ExportDocument> {
    let db = db.lock().await;
    let conn = db.connection();

    Ok(ExportDocument {
        exported_at: unix_timestamp_millis(),
        settings: LibSqlSettingsRepository::new(conn).profile().await?,
        transactions: LibSqlTransactionRepository::new(conn).list_active().await?,
        annual_transactions: LibSqlAnnualTransactionRepository::new(conn)
            .list_active()
            .await?,
        categories: LibSqlCategoryRepository::new(conn).list_active().await?,
        recurring_rules: LibSqlRecurringRuleRepository::new(conn)
            .list_active()
            .await?,
    })
}

/// Render an export document as JSON.
pub fn render_export(document: &ExportDocument, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(document)
    } else {
        serde_json::to_string(document)
    }
}

/// Build a deterministic default file name for export flows.
#[must_use]
pub fn suggested_export_file_name(timestamp_ms: i64) -> String {
    format!("centi-export-{timestamp_ms}.json")
}
