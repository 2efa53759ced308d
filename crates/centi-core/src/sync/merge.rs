//! Last-write-wins merge resolver
//!
//! The single conflict-resolution primitive shared by remote sync and bulk
//! import. Whole-record, not field-level: the side with the strictly newer
//! `updated_at` replaces the other wholesale, and an exact tie keeps the
//! already-held (local) record so replicas don't ping-pong redundant writes.

use std::collections::HashMap;

use crate::models::Syncable;

/// Merge two record sets of the same collection by id.
///
/// Pure and side-effect free. Output order is unspecified; ordering is the
/// caller's concern. Idempotent (`merge(x, x) == x`) and associative, so
/// repeated or re-ordered passes converge on the same set.
#[must_use]
pub fn merge<T: Syncable>(local: Vec<T>, remote: Vec<T>) -> Vec<T> {
    let mut map: HashMap<String, T> = local
        .into_iter()
        .map(|record| (record.id().to_string(), record))
        .collect();

    for record in remote {
        match map.get(record.id()) {
            None => {
                map.insert(record.id().to_string(), record);
            }
            Some(existing) => {
                if record.updated_at() > existing.updated_at() {
                    tracing::debug!(
                        "merge conflict on {}: remote ({}) > local ({}), remote wins",
                        record.id(),
                        record.updated_at(),
                        existing.updated_at()
                    );
                    map.insert(record.id().to_string(), record);
                }
            }
        }
    }

    map.into_values().collect()
}
