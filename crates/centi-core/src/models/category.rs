//! Category model

use serde::{Deserialize, Serialize};

use super::{new_record_id, Syncable};
use crate::util::unix_timestamp_millis;

/// A spending/income category with manual ordering and picker gating flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Unique identifier
    pub id: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last mutation timestamp (Unix ms)
    pub updated_at: i64,
    /// Tombstone timestamp; `None` for live records
    pub deleted_at: Option<i64>,
    /// Display name
    pub name: String,
    /// Hex colour, e.g. `#f97316`
    pub colour: String,
    /// Icon glyph
    pub icon: String,
    /// Manual ordering position (lower sorts first)
    pub priority: i64,
    /// Only offered for annual transactions
    pub is_annual_only: bool,
    /// Only offered for income entries
    pub is_income_only: bool,
}

impl Category {
    /// Create a new category at the given ordering position.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        colour: impl Into<String>,
        icon: impl Into<String>,
        priority: i64,
    ) -> Self {
        let now = unix_timestamp_millis();
        Self {
            id: new_record_id(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            name: name.into(),
            colour: colour.into(),
            icon: icon.into(),
            priority,
            is_annual_only: false,
            is_income_only: false,
        }
    }
}

impl Syncable for Category {
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
