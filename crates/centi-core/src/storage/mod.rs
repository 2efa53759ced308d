//! Remote blob store abstraction.
//!
//! Sync treats the remote side as one flat folder of JSON files named by
//! deterministic shard keys. Any backend that can list/read/write/trash files
//! under a root container can implement [`BlobStore`]; the bundled
//! implementation speaks a Drive-style REST protocol.

mod drive;

pub use drive::{DriveClient, DriveConfig};

use regex::Regex;
use thiserror::Error;

/// Remote file holding the full Category collection.
pub const CATEGORIES_FILE: &str = "categories.json";
/// Remote file holding the full RecurringRule collection.
pub const RECURRING_RULES_FILE: &str = "recurring-rules.json";
/// Remote file holding the settings singleton.
pub const SETTINGS_FILE: &str = "settings.json";

/// Shard file name for one month of periodic transactions, `YYYY-MM.json`.
#[must_use]
pub fn month_file_name(year: i32, month: u32) -> String {
    format!("{year}-{month:02}.json")
}

/// Shard file name for one year of annual transactions, `YYYY-bucks.json`.
#[must_use]
pub fn annual_file_name(year: i32) -> String {
    format!("{year}-bucks.json")
}

/// Whether a remote file name is a month shard.
#[must_use]
pub fn is_month_file(name: &str) -> bool {
    let re = Regex::new(r"^\d{4}-\d{2}\.json$").expect("Invalid regex");
    re.is_match(name)
}

/// Whether a remote file name is an annual shard.
#[must_use]
pub fn is_annual_file(name: &str) -> bool {
    let re = Regex::new(r"^\d{4}-bucks\.json$").expect("Invalid regex");
    re.is_match(name)
}

/// A file entry in the remote root container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Backend-assigned file identifier
    pub id: String,
    /// Logical shard name, e.g. `2024-03.json`
    pub name: String,
}

/// Errors from remote blob operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// Client was constructed with unusable endpoints
    #[error("Invalid blob store configuration: {0}")]
    InvalidConfiguration(String),

    /// Transport-level failure (connect, timeout, TLS)
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote API answered with a non-success status
    #[error("Remote API error: {message} ({status})")]
    Api { status: u16, message: String },

    /// The remote payload could not be interpreted
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
}

impl StorageError {
    /// Whether the failure indicates a rejected credential.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Api { status, .. } => matches!(status, 401 | 403),
            Self::Transport(error) => error
                .status()
                .is_some_and(|status| matches!(status.as_u16(), 401 | 403)),
            Self::InvalidConfiguration(_) | Self::InvalidPayload(_) => false,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Abstract keyed blob store backing remote sync.
#[allow(async_fn_in_trait)]
pub trait BlobStore {
    /// Locate or create the well-known root container, returning its id.
    async fn ensure_root(&self, token: &str) -> StorageResult<String>;

    /// List all files directly under the root container.
    async fn list(&self, token: &str, root_id: &str) -> StorageResult<Vec<RemoteFile>>;

    /// Download a file's content by id.
    async fn download(&self, token: &str, file_id: &str) -> StorageResult<Vec<u8>>;

    /// Create or overwrite the file with the given logical name.
    async fn upsert(
        &self,
        token: &str,
        root_id: &str,
        name: &str,
        payload: &[u8],
    ) -> StorageResult<()>;

    /// Move a file to the backend's trash.
    async fn trash(&self, token: &str, file_id: &str) -> StorageResult<()>;
}
