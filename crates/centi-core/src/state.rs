//! Shared cross-platform state types.

/// Sync state observed by client shells.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SyncStatus {
    /// No sync pass is running and the last one (if any) succeeded.
    #[default]
    Idle,
    /// A sync pass is in flight.
    Syncing,
    /// The last sync pass failed with the given message.
    Error(String),
}

impl SyncStatus {
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}
