//! Database layer for Centi

mod annual;
mod categories;
mod connection;
mod migrations;
mod recurring_rules;
pub mod seed;
mod settings_repository;
mod transactions;

pub use annual::{AnnualTransactionRepository, LibSqlAnnualTransactionRepository};
pub use categories::{CategoryRepository, LibSqlCategoryRepository};
pub use connection::Database;
pub use recurring_rules::{LibSqlRecurringRuleRepository, RecurringRuleRepository};
pub use seed::SeedMarker;
pub use settings_repository::{LibSqlSettingsRepository, SettingsRepository};
pub use transactions::{LibSqlTransactionRepository, TransactionRepository};

/// Days a tombstone is retained before `purge_expired` may drop it.
pub const PURGE_AFTER_DAYS: i64 = 30;
