//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: Initial schema
async fn migrate_v1(conn: &Connection) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    // inside a transaction for atomicity

    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Periodic transactions, sharded by (year, month)
        "CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            transacted_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            category_id TEXT,
            amount INTEGER NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            description TEXT NOT NULL,
            is_income INTEGER NOT NULL DEFAULT 0
        )",
        "CREATE INDEX IF NOT EXISTS idx_transactions_year_month ON transactions(year, month)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_deleted ON transactions(deleted_at)",
        // Annual transactions, sharded by year
        "CREATE TABLE IF NOT EXISTS annual_transactions (
            id TEXT PRIMARY KEY,
            transacted_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            category_id TEXT,
            amount INTEGER NOT NULL,
            year INTEGER NOT NULL,
            description TEXT NOT NULL,
            is_income INTEGER NOT NULL DEFAULT 0
        )",
        "CREATE INDEX IF NOT EXISTS idx_annual_transactions_year ON annual_transactions(year)",
        "CREATE INDEX IF NOT EXISTS idx_annual_transactions_deleted ON annual_transactions(deleted_at)",
        // Categories
        "CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            name TEXT NOT NULL,
            colour TEXT NOT NULL,
            icon TEXT NOT NULL,
            priority INTEGER NOT NULL,
            is_annual_only INTEGER NOT NULL DEFAULT 0,
            is_income_only INTEGER NOT NULL DEFAULT 0
        )",
        "CREATE INDEX IF NOT EXISTS idx_categories_priority ON categories(priority)",
        // Recurring rules
        "CREATE TABLE IF NOT EXISTS recurring_rules (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            amount INTEGER NOT NULL,
            is_income INTEGER NOT NULL DEFAULT 0,
            is_annual INTEGER NOT NULL DEFAULT 0,
            category_id TEXT,
            description TEXT NOT NULL,
            frequency TEXT NOT NULL,
            day_of_week INTEGER,
            day_of_month INTEGER,
            month_of_year INTEGER,
            next_generation_at INTEGER NOT NULL,
            last_generated_at INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1
        )",
        "CREATE INDEX IF NOT EXISTS idx_recurring_rules_next_generation ON recurring_rules(next_generation_at)",
        // Settings table (profile settings + local sync bookkeeping)
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
