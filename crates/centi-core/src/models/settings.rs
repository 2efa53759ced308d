//! Profile settings model

use serde::{Deserialize, Serialize};

/// The synced settings singleton.
///
/// Merged wholesale by `updated_at` rather than per-record: whichever replica
/// carries the newer timestamp wins all fields. This struct is also the wire
/// shape of the remote `settings.json` blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSettings {
    /// Display currency symbol or code (free text)
    pub custom_currency: String,
    /// Render the currency before the amount
    pub is_prefix_currency: bool,
    /// Last mutation timestamp (Unix ms)
    pub updated_at: i64,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            custom_currency: String::new(),
            is_prefix_currency: true,
            updated_at: 0,
        }
    }
}
