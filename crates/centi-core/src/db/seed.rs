//! First-run seed data
//!
//! New installs get a handful of demo records so the app isn't empty. Their
//! ids are tracked in a seed marker; until the user decides to keep or discard
//! them, the sync engine refuses to upload, so demo content never reaches a
//! real remote store uninvited.

use libsql::Connection;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{AnnualTransaction, Category, Transaction};
use crate::util::unix_timestamp_millis;

use super::annual::{AnnualTransactionRepository, LibSqlAnnualTransactionRepository};
use super::categories::{CategoryRepository, LibSqlCategoryRepository};
use super::settings_repository::{LibSqlSettingsRepository, SettingsRepository};
use super::transactions::{LibSqlTransactionRepository, TransactionRepository};

/// Ids of the demo records inserted on first run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedMarker {
    pub category_ids: Vec<String>,
    pub transaction_ids: Vec<String>,
    pub annual_ids: Vec<String>,
}

/// Insert the demo records and store their ids as the seed marker.
///
/// No-op when a marker is already present.
pub async fn seed(conn: &Connection) -> Result<()> {
    let settings = LibSqlSettingsRepository::new(conn);
    if settings.seed_marker().await?.is_some() {
        return Ok(());
    }

    let categories = LibSqlCategoryRepository::new(conn);
    let transactions = LibSqlTransactionRepository::new(conn);
    let annual = LibSqlAnnualTransactionRepository::new(conn);
    let now = unix_timestamp_millis();

    let food = categories
        .create(Category::new("Food", "#f97316", "🍔", 0))
        .await?;
    let grocery = categories
        .create(Category::new("Grocery", "#22c55e", "🛒", 1))
        .await?;
    let mut videogame = Category::new("Videogame", "#8b5cf6", "🎮", 2);
    videogame.is_annual_only = true;
    let videogame = categories.create(videogame).await?;

    let eggs = transactions
        .create(Transaction::new(
            now,
            500,
            false,
            Some(grocery.id.clone()),
            "Eggs",
        ))
        .await?;
    let sandwich = transactions
        .create(Transaction::new(
            now,
            1000,
            false,
            Some(food.id.clone()),
            "Sandwich",
        ))
        .await?;

    let game = annual
        .create(AnnualTransaction::new(
            now,
            2000,
            false,
            Some(videogame.id.clone()),
            "What Remains of Edith Finch",
        ))
        .await?;

    let marker = SeedMarker {
        category_ids: vec![food.id, grocery.id, videogame.id],
        transaction_ids: vec![eggs.id, sandwich.id],
        annual_ids: vec![game.id],
    };
    settings.set_seed_marker(Some(&marker)).await?;

    tracing::info!("Seeded demo records for first run");
    Ok(())
}

/// Keep the seed records: clear the marker so they become ordinary records.
pub async fn keep_seed_records(conn: &Connection) -> Result<()> {
    LibSqlSettingsRepository::new(conn)
        .set_seed_marker(None)
        .await
}

/// Discard the seed records: hard-delete them and clear the marker.
///
/// Hard deletion, not a tombstone: discarded demo rows must
/// not merge into the remote store even as deletions.
pub async fn discard_seed_records(conn: &Connection) -> Result<()> {
    let settings = LibSqlSettingsRepository::new(conn);
    let Some(marker) = settings.seed_marker().await? else {
        return Ok(());
    };

    conn.execute("BEGIN TRANSACTION", ()).await?;
    let result = delete_marked(conn, &marker).await;
    if let Err(e) = result {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e);
    }
    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    settings.set_seed_marker(None).await?;
    tracing::info!("Discarded seed records before first sync");
    Ok(())
}

async fn delete_marked(conn: &Connection, marker: &SeedMarker) -> Result<()> {
    for id in &marker.category_ids {
        conn.execute("DELETE FROM categories WHERE id = ?", [id.as_str()])
            .await?;
    }
    for id in &marker.transaction_ids {
        conn.execute("DELETE FROM transactions WHERE id = ?", [id.as_str()])
            .await?;
    }
    for id in &marker.annual_ids {
        conn.execute("DELETE FROM annual_transactions WHERE id = ?", [id.as_str()])
            .await?;
    }
    Ok(())
}
