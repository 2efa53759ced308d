//! Transaction models
//!
//! Two collections share this file: everyday periodic transactions sharded by
//! (year, month), and large annual transactions sharded by year alone. Shard
//! key fields are derived from the occurrence timestamp and recomputed on
//! every change to it.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use super::{new_record_id, Syncable};
use crate::util::{millis_to_local_naive, unix_timestamp_millis};

/// Derive the (year, month) shard key from an occurrence timestamp.
#[must_use]
pub(crate) fn shard_key_of(transacted_at: i64) -> (i32, u32) {
    let local = millis_to_local_naive(transacted_at);
    (local.year(), local.month())
}

/// An everyday expense or income entry, synced in per-month shards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique identifier
    pub id: String,
    /// Occurrence timestamp (Unix ms)
    pub transacted_at: i64,
    /// Last mutation timestamp (Unix ms)
    pub updated_at: i64,
    /// Tombstone timestamp; `None` for live records
    pub deleted_at: Option<i64>,
    /// Optional category reference
    pub category_id: Option<String>,
    /// Amount in integer minor units
    pub amount: i64,
    /// Shard year, derived from `transacted_at`
    pub year: i32,
    /// Shard month (1-12), derived from `transacted_at`
    pub month: u32,
    /// Free-text description
    pub description: String,
    /// Income rather than expense
    pub is_income: bool,
}

impl Transaction {
    /// Create a new transaction occurring at `transacted_at`.
    #[must_use]
    pub fn new(
        transacted_at: i64,
        amount: i64,
        is_income: bool,
        category_id: Option<String>,
        description: impl Into<String>,
    ) -> Self {
        let (year, month) = shard_key_of(transacted_at);
        Self {
            id: new_record_id(),
            transacted_at,
            updated_at: unix_timestamp_millis(),
            deleted_at: None,
            category_id,
            amount,
            year,
            month,
            description: description.into(),
            is_income,
        }
    }
}

impl Syncable for Transaction {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn deleted_at(&self) -> Option<i64> {
        self.deleted_at
    }
}

/// A large, infrequent entry, synced in per-year shards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualTransaction {
    /// Unique identifier
    pub id: String,
    /// Occurrence timestamp (Unix ms)
    pub transacted_at: i64,
    /// Last mutation timestamp (Unix ms)
    pub updated_at: i64,
    /// Tombstone timestamp; `None` for live records
    pub deleted_at: Option<i64>,
    /// Optional category reference
    pub category_id: Option<String>,
    /// Amount in integer minor units
    pub amount: i64,
    /// Shard year, derived from `transacted_at`
    pub year: i32,
    /// Free-text description
    pub description: String,
    /// Income rather than expense
    pub is_income: bool,
}

impl AnnualTransaction {
    /// Create a new annual transaction occurring at `transacted_at`.
    #[must_use]
    pub fn new(
        transacted_at: i64,
        amount: i64,
        is_income: bool,
        category_id: Option<String>,
        description: impl Into<String>,
    ) -> Self {
        let (year, _) = shard_key_of(transacted_at);
        Self {
            id: new_record_id(),
            transacted_at,
            updated_at: unix_timestamp_millis(),
            deleted_at: None,
            category_id,
            amount,
            year,
            description: description.into(),
            is_income,
        }
    }
}

impl Syncable for AnnualTransaction {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn deleted_at(&self) -> Option<i64> {
        self.deleted_at
    }
}
