//! Data models for Centi

mod category;
mod recurring;
mod settings;
mod transaction;

pub use category::Category;
pub use recurring::{Frequency, RecurringRule};
pub use settings::ProfileSettings;
pub(crate) use transaction::shard_key_of;
pub use transaction::{AnnualTransaction, Transaction};

use uuid::Uuid;

/// Create a new record id using UUID v7 (time-sortable).
#[must_use]
pub fn new_record_id() -> String {
    Uuid::now_v7().to_string()
}

/// Common surface of the four synced collections.
///
/// Ids are opaque strings: remote replicas may carry ids this device never
/// minted, so no structure beyond uniqueness is assumed.
pub trait Syncable {
    /// Unique, immutable record identifier.
    fn id(&self) -> &str;

    /// Last-mutation timestamp (Unix ms); the conflict-resolution key.
    fn updated_at(&self) -> i64;

    /// Tombstone timestamp, if the record is soft-deleted.
    fn deleted_at(&self) -> Option<i64>;

    /// Whether the record is tombstoned.
    fn is_tombstoned(&self) -> bool {
        self.deleted_at().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_are_unique() {
        assert_ne!(new_record_id(), new_record_id());
    }
}
