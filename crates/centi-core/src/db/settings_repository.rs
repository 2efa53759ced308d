//! Settings repository implementation
//!
//! One key/value table backs two kinds of state: the synced profile settings
//! blob (currency display) and local-only sync bookkeeping (cached remote
//! folder id, last-sync timestamp, seed marker). Only the profile settings
//! ever leave the device.

use libsql::Connection;

use crate::error::Result;
use crate::models::ProfileSettings;
use crate::util::normalize_text_option;

use super::seed::SeedMarker;

const KEY_CUSTOM_CURRENCY: &str = "custom_currency";
const KEY_IS_PREFIX_CURRENCY: &str = "is_prefix_currency";
const KEY_SETTINGS_UPDATED_AT: &str = "settings_updated_at";
const KEY_REMOTE_ROOT_ID: &str = "remote_root_id";
const KEY_LAST_SYNCED_AT: &str = "last_synced_at";
const KEY_SEED_MARKER: &str = "seed_marker";

/// Trait for settings storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SettingsRepository {
    /// Load the synced profile settings
    async fn profile(&self) -> Result<ProfileSettings>;

    /// Save the profile settings verbatim (timestamps are the caller's)
    async fn save_profile(&self, settings: &ProfileSettings) -> Result<()>;

    /// Cached remote root container id
    async fn remote_root_id(&self) -> Result<Option<String>>;

    /// Cache (or clear) the remote root container id
    async fn set_remote_root_id(&self, id: Option<&str>) -> Result<()>;

    /// Completion time of the last successful sync pass
    async fn last_synced_at(&self) -> Result<Option<i64>>;

    /// Record the completion time of a sync pass
    async fn set_last_synced_at(&self, timestamp_ms: i64) -> Result<()>;

    /// Ids of still-pending first-run seed records
    async fn seed_marker(&self) -> Result<Option<SeedMarker>>;

    /// Store (or clear) the seed marker
    async fn set_seed_marker(&self, marker: Option<&SeedMarker>) -> Result<()>;
}

/// libSQL implementation of `SettingsRepository`
pub struct LibSqlSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM settings WHERE key = ?", [key])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn clear_setting(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?", [key])
            .await?;
        Ok(())
    }
}

impl SettingsRepository for LibSqlSettingsRepository<'_> {
    async fn profile(&self) -> Result<ProfileSettings> {
        let mut settings = ProfileSettings::default();

        if let Some(value) = self.get_setting(KEY_CUSTOM_CURRENCY).await? {
            settings.custom_currency = value;
        }

        if let Some(value) = self.get_setting(KEY_IS_PREFIX_CURRENCY).await? {
            settings.is_prefix_currency = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        if let Some(value) = self.get_setting(KEY_SETTINGS_UPDATED_AT).await? {
            if let Ok(timestamp) = value.parse() {
                settings.updated_at = timestamp;
            }
        }

        Ok(settings)
    }

    async fn save_profile(&self, settings: &ProfileSettings) -> Result<()> {
        self.set_setting(KEY_CUSTOM_CURRENCY, &settings.custom_currency)
            .await?;
        self.set_setting(
            KEY_IS_PREFIX_CURRENCY,
            if settings.is_prefix_currency {
                "true"
            } else {
                "false"
            },
        )
        .await?;
        self.set_setting(KEY_SETTINGS_UPDATED_AT, &settings.updated_at.to_string())
            .await?;
        Ok(())
    }

    async fn remote_root_id(&self) -> Result<Option<String>> {
        Ok(normalize_text_option(
            self.get_setting(KEY_REMOTE_ROOT_ID).await?,
        ))
    }

    async fn set_remote_root_id(&self, id: Option<&str>) -> Result<()> {
        match normalize_text_option(id.map(ToOwned::to_owned)) {
            Some(id) => self.set_setting(KEY_REMOTE_ROOT_ID, &id).await,
            None => self.clear_setting(KEY_REMOTE_ROOT_ID).await,
        }
    }

    async fn last_synced_at(&self) -> Result<Option<i64>> {
        Ok(self
            .get_setting(KEY_LAST_SYNCED_AT)
            .await?
            .and_then(|value| value.parse().ok()))
    }

    async fn set_last_synced_at(&self, timestamp_ms: i64) -> Result<()> {
        self.set_setting(KEY_LAST_SYNCED_AT, &timestamp_ms.to_string())
            .await
    }

    async fn seed_marker(&self) -> Result<Option<SeedMarker>> {
        match self.get_setting(KEY_SEED_MARKER).await? {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    async fn set_seed_marker(&self, marker: Option<&SeedMarker>) -> Result<()> {
        match marker {
            Some(marker) => {
                let value = serde_json::to_string(marker)?;
                self.set_setting(KEY_SEED_MARKER, &value).await
            }
            None => self.clear_setting(KEY_SEED_MARKER).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_default_profile() {
        let db = setup().await;
        let repo = LibSqlSettingsRepository::new(db.connection());

        let settings = repo.profile().await.unwrap();
        assert_eq!(settings, ProfileSettings::default());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_and_load_profile() {
        let db = setup().await;
        let repo = LibSqlSettingsRepository::new(db.connection());

        let settings = ProfileSettings {
            custom_currency: "kr".to_string(),
            is_prefix_currency: false,
            updated_at: 1_700_000_000_000,
        };
        repo.save_profile(&settings).await.unwrap();

        let loaded = repo.profile().await.unwrap();
        assert_eq!(loaded, settings);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_root_id_set_and_clear() {
        let db = setup().await;
        let repo = LibSqlSettingsRepository::new(db.connection());

        assert_eq!(repo.remote_root_id().await.unwrap(), None);

        repo.set_remote_root_id(Some("folder-1")).await.unwrap();
        assert_eq!(
            repo.remote_root_id().await.unwrap(),
            Some("folder-1".to_string())
        );

        repo.set_remote_root_id(None).await.unwrap();
        assert_eq!(repo.remote_root_id().await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_seed_marker_round_trip() {
        let db = setup().await;
        let repo = LibSqlSettingsRepository::new(db.connection());

        let marker = SeedMarker {
            category_ids: vec!["c1".to_string()],
            transaction_ids: vec!["t1".to_string(), "t2".to_string()],
            annual_ids: vec!["a1".to_string()],
        };
        repo.set_seed_marker(Some(&marker)).await.unwrap();
        assert_eq!(repo.seed_marker().await.unwrap(), Some(marker));

        repo.set_seed_marker(None).await.unwrap();
        assert_eq!(repo.seed_marker().await.unwrap(), None);
    }
}
