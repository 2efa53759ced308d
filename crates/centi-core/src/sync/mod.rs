//! Remote sync for Centi
//!
//! Last-write-wins reconciliation of the four record collections plus the
//! settings singleton against a file-based remote store.

mod engine;
mod merge;
mod scheduler;

pub use engine::{SeedDecision, SyncEngine, SyncError, SyncOutcome};
pub use merge::merge;
pub use scheduler::SyncScheduler;
