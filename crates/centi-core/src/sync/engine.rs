//! Sync orchestrator
//!
//! Drives one full reconciliation pass between the local record store and the
//! remote blob store: root discovery, duplicate-file cleanup, settings
//! reconciliation, per-shard merge, then a full re-upload of the merged state.
//! State lives on the engine instance (no module globals) so tests can run
//! concurrent engines against independent stores.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::auth::{AuthError, CredentialProvider};
use crate::db::{
    seed, AnnualTransactionRepository, CategoryRepository, Database,
    LibSqlAnnualTransactionRepository, LibSqlCategoryRepository, LibSqlRecurringRuleRepository,
    LibSqlSettingsRepository, LibSqlTransactionRepository, RecurringRuleRepository,
    SettingsRepository, TransactionRepository, PURGE_AFTER_DAYS,
};
use crate::models::{AnnualTransaction, Category, ProfileSettings, RecurringRule, Transaction};
use crate::state::SyncStatus;
use crate::storage::{
    annual_file_name, is_annual_file, is_month_file, month_file_name, BlobStore, StorageError,
    CATEGORIES_FILE, RECURRING_RULES_FILE, SETTINGS_FILE,
};
use crate::util::unix_timestamp_millis;

use super::merge::merge;

/// Errors surfaced by a sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote blob store failure (network, API)
    #[error("Remote storage error: {0}")]
    Storage(#[from] StorageError),

    /// Credential provider failure
    #[error("Credential provider error: {0}")]
    Auth(#[from] AuthError),

    /// Local record store failure
    #[error("Local store error: {0}")]
    Database(#[from] crate::error::Error),

    /// The credential was rejected, a forced refresh was rejected too;
    /// the user must sign in again
    #[error("Sign-in required: the remote store rejected the stored credential")]
    ReauthRequired,
}

impl SyncError {
    fn is_unauthorized(&self) -> bool {
        match self {
            Self::Storage(error) => error.is_unauthorized(),
            _ => false,
        }
    }
}

/// How a sync invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A full pass ran to completion
    Completed,
    /// No credential available; nothing was attempted
    SkippedNoCredentials,
    /// Another pass was in flight; this trigger was dropped
    SkippedAlreadyRunning,
    /// First-run seed records need a keep/discard decision before the
    /// remote store is touched
    AwaitingSeedDecision,
}

/// The user's answer to the seed-carryover prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedDecision {
    /// Convert the demo records into ordinary records
    Keep,
    /// Hard-delete the demo records
    Discard,
}

/// Reconciles the local store against a remote blob store.
pub struct SyncEngine<B, C> {
    db: Arc<Mutex<Database>>,
    blobs: B,
    credentials: C,
    in_flight: AtomicBool,
    status: RwLock<SyncStatus>,
}

struct LocalSnapshot {
    transactions: Vec<Transaction>,
    annual: Vec<AnnualTransaction>,
    categories: Vec<Category>,
    rules: Vec<RecurringRule>,
}

impl<B: BlobStore, C: CredentialProvider> SyncEngine<B, C> {
    #[must_use]
    pub fn new(db: Arc<Mutex<Database>>, blobs: B, credentials: C) -> Self {
        Self {
            db,
            blobs,
            credentials,
            in_flight: AtomicBool::new(false),
            status: RwLock::new(SyncStatus::Idle),
        }
    }

    /// Current sync status for UI observation.
    pub fn status(&self) -> SyncStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_status(&self, status: SyncStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Completion time of the last successful pass, if any.
    pub async fn last_synced_at(&self) -> Result<Option<i64>, SyncError> {
        let db = self.db.lock().await;
        Ok(LibSqlSettingsRepository::new(db.connection())
            .last_synced_at()
            .await?)
    }

    /// Run one reconciliation pass.
    ///
    /// Overlapping calls are dropped. A missing credential is a silent
    /// no-op, not an error. A 401-class rejection triggers exactly one
    /// forced token refresh and whole-pass retry; a second rejection
    /// invalidates the credential and returns [`SyncError::ReauthRequired`].
    pub async fn sync(&self) -> Result<SyncOutcome, SyncError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Sync already in flight, dropping trigger");
            return Ok(SyncOutcome::SkippedAlreadyRunning);
        }

        let result = self.sync_inner().await;
        self.in_flight.store(false, Ordering::SeqCst);

        match &result {
            Ok(outcome) => {
                tracing::debug!("Sync finished: {outcome:?}");
                self.set_status(SyncStatus::Idle);
            }
            Err(error) => {
                tracing::warn!("Sync failed: {error}");
                self.set_status(SyncStatus::Error(error.to_string()));
            }
        }
        result
    }

    async fn sync_inner(&self) -> Result<SyncOutcome, SyncError> {
        let Some(credential) = self.credentials.valid_token().await? else {
            tracing::debug!("No credential available, skipping sync");
            return Ok(SyncOutcome::SkippedNoCredentials);
        };

        if self.seed_marker_present().await? {
            tracing::info!("Seed records await a keep/discard decision; sync deferred");
            return Ok(SyncOutcome::AwaitingSeedDecision);
        }

        self.set_status(SyncStatus::Syncing);

        match self.run_pass(&credential.token).await {
            Ok(()) => Ok(SyncOutcome::Completed),
            Err(error) if error.is_unauthorized() => {
                tracing::warn!("Remote rejected credential, forcing one refresh: {error}");
                let Some(fresh) = self.credentials.refresh_token(true).await? else {
                    self.credentials.invalidate().await?;
                    return Err(SyncError::ReauthRequired);
                };
                match self.run_pass(&fresh.token).await {
                    Ok(()) => Ok(SyncOutcome::Completed),
                    Err(retry_error) if retry_error.is_unauthorized() => {
                        self.credentials.invalidate().await?;
                        Err(SyncError::ReauthRequired)
                    }
                    Err(retry_error) => Err(retry_error),
                }
            }
            Err(error) => Err(error),
        }
    }

    /// Resolve the seed-carryover gate; the next `sync` call proceeds.
    pub async fn resolve_seed_carryover(&self, decision: SeedDecision) -> Result<(), SyncError> {
        let db = self.db.lock().await;
        match decision {
            SeedDecision::Keep => seed::keep_seed_records(db.connection()).await?,
            SeedDecision::Discard => seed::discard_seed_records(db.connection()).await?,
        }
        Ok(())
    }

    async fn seed_marker_present(&self) -> Result<bool, SyncError> {
        let db = self.db.lock().await;
        Ok(LibSqlSettingsRepository::new(db.connection())
            .seed_marker()
            .await?
            .is_some())
    }

    async fn run_pass(&self, token: &str) -> Result<(), SyncError> {
        self.purge_expired().await?;

        let root_id = self.ensure_root(token).await?;

        // Deduplicate drifted remote state: a logical name must map to
        // exactly one file before merging starts. Keep the first, trash
        // the rest.
        let files = self.blobs.list(token, &root_id).await?;
        let mut by_name: HashMap<String, String> = HashMap::new();
        let mut extras = Vec::new();
        for file in files {
            if by_name.contains_key(&file.name) {
                extras.push(file.id);
            } else {
                by_name.insert(file.name, file.id);
            }
        }
        if !extras.is_empty() {
            tracing::warn!("Trashing {} duplicate remote file(s)", extras.len());
            for file_id in &extras {
                self.blobs.trash(token, file_id).await?;
            }
        }

        self.reconcile_settings(token, &root_id, &by_name).await?;

        let snapshot = self.local_snapshot().await?;

        if let Some(file_id) = by_name.get(CATEGORIES_FILE) {
            let remote: Vec<Category> = self.download_json(token, file_id).await?;
            let merged = merge(snapshot.categories, remote);
            let db = self.db.lock().await;
            LibSqlCategoryRepository::new(db.connection())
                .put_many(&merged)
                .await?;
        }

        if let Some(file_id) = by_name.get(RECURRING_RULES_FILE) {
            let remote: Vec<RecurringRule> = self.download_json(token, file_id).await?;
            let merged = merge(snapshot.rules, remote);
            let db = self.db.lock().await;
            LibSqlRecurringRuleRepository::new(db.connection())
                .put_many(&merged)
                .await?;
        }

        // Month shards present remotely are merged here; shards that exist
        // only locally surface in the re-upload step below.
        let local_months = group_month_shards(snapshot.transactions);
        let remote_months: Vec<String> = by_name
            .keys()
            .filter(|name| is_month_file(name))
            .cloned()
            .collect();
        for name in &remote_months {
            let Some(file_id) = by_name.get(name) else {
                continue;
            };
            let local_slice = local_months.get(name).cloned().unwrap_or_default();
            let remote: Vec<Transaction> = self.download_json(token, file_id).await?;
            let merged = merge(local_slice, remote);
            let db = self.db.lock().await;
            LibSqlTransactionRepository::new(db.connection())
                .put_many(&merged)
                .await?;
        }

        let local_years = group_annual_shards(snapshot.annual);
        let remote_years: Vec<String> = by_name
            .keys()
            .filter(|name| is_annual_file(name))
            .cloned()
            .collect();
        for name in &remote_years {
            let Some(file_id) = by_name.get(name) else {
                continue;
            };
            let local_slice = local_years.get(name).cloned().unwrap_or_default();
            let remote: Vec<AnnualTransaction> = self.download_json(token, file_id).await?;
            let merged = merge(local_slice, remote);
            let db = self.db.lock().await;
            LibSqlAnnualTransactionRepository::new(db.connection())
                .put_many(&merged)
                .await?;
        }

        // Re-read the merged state and upload every shard, including
        // unchanged ones, so the remote reflects the authoritative result
        // even when a local write raced the pass.
        let merged = self.local_snapshot().await?;

        self.upload_json(token, &root_id, CATEGORIES_FILE, &merged.categories)
            .await?;
        self.upload_json(token, &root_id, RECURRING_RULES_FILE, &merged.rules)
            .await?;

        for (name, records) in group_month_shards(merged.transactions) {
            self.upload_json(token, &root_id, &name, &records).await?;
        }
        for (name, records) in group_annual_shards(merged.annual) {
            self.upload_json(token, &root_id, &name, &records).await?;
        }

        let now = unix_timestamp_millis();
        {
            let db = self.db.lock().await;
            LibSqlSettingsRepository::new(db.connection())
                .set_last_synced_at(now)
                .await?;
        }
        tracing::info!("Sync pass completed");
        Ok(())
    }

    /// The settings singleton merges wholesale: the side with the newer
    /// timestamp wins every field, then the winner is written back remotely.
    async fn reconcile_settings(
        &self,
        token: &str,
        root_id: &str,
        by_name: &HashMap<String, String>,
    ) -> Result<(), SyncError> {
        if let Some(file_id) = by_name.get(SETTINGS_FILE) {
            let remote: ProfileSettings = self.download_json(token, file_id).await?;
            let db = self.db.lock().await;
            let repo = LibSqlSettingsRepository::new(db.connection());
            let local = repo.profile().await?;
            if remote.updated_at > local.updated_at {
                tracing::debug!("Remote settings newer, applying");
                repo.save_profile(&remote).await?;
            }
        }

        let current = {
            let db = self.db.lock().await;
            LibSqlSettingsRepository::new(db.connection())
                .profile()
                .await?
        };
        self.upload_json(token, root_id, SETTINGS_FILE, &current)
            .await
    }

    async fn ensure_root(&self, token: &str) -> Result<String, SyncError> {
        {
            let db = self.db.lock().await;
            if let Some(cached) = LibSqlSettingsRepository::new(db.connection())
                .remote_root_id()
                .await?
            {
                return Ok(cached);
            }
        }

        let root_id = self.blobs.ensure_root(token).await?;
        let db = self.db.lock().await;
        LibSqlSettingsRepository::new(db.connection())
            .set_remote_root_id(Some(&root_id))
            .await?;
        Ok(root_id)
    }

    async fn purge_expired(&self) -> Result<(), SyncError> {
        let cutoff = unix_timestamp_millis() - PURGE_AFTER_DAYS * 24 * 60 * 60 * 1000;
        let db = self.db.lock().await;
        let conn = db.connection();

        let mut purged = 0;
        purged += LibSqlTransactionRepository::new(conn)
            .purge_expired(cutoff)
            .await?;
        purged += LibSqlAnnualTransactionRepository::new(conn)
            .purge_expired(cutoff)
            .await?;
        purged += LibSqlCategoryRepository::new(conn)
            .purge_expired(cutoff)
            .await?;
        purged += LibSqlRecurringRuleRepository::new(conn)
            .purge_expired(cutoff)
            .await?;

        if purged > 0 {
            tracing::debug!("Purged {purged} expired tombstone(s)");
        }
        Ok(())
    }

    async fn local_snapshot(&self) -> Result<LocalSnapshot, SyncError> {
        let db = self.db.lock().await;
        let conn = db.connection();
        Ok(LocalSnapshot {
            transactions: LibSqlTransactionRepository::new(conn).list_all().await?,
            annual: LibSqlAnnualTransactionRepository::new(conn)
                .list_all()
                .await?,
            categories: LibSqlCategoryRepository::new(conn).list_all().await?,
            rules: LibSqlRecurringRuleRepository::new(conn).list_all().await?,
        })
    }

    async fn download_json<T: DeserializeOwned>(
        &self,
        token: &str,
        file_id: &str,
    ) -> Result<T, SyncError> {
        let bytes = self.blobs.download(token, file_id).await?;
        serde_json::from_slice(&bytes)
            .map_err(|error| StorageError::InvalidPayload(error.to_string()).into())
    }

    async fn upload_json<T: Serialize>(
        &self,
        token: &str,
        root_id: &str,
        name: &str,
        value: &T,
    ) -> Result<(), SyncError> {
        let payload = serde_json::to_vec(value).map_err(crate::error::Error::from)?;
        self.blobs.upsert(token, root_id, name, &payload).await?;
        Ok(())
    }
}

fn group_month_shards(records: Vec<Transaction>) -> HashMap<String, Vec<Transaction>> {
    let mut shards: HashMap<String, Vec<Transaction>> = HashMap::new();
    for record in records {
        shards
            .entry(month_file_name(record.year, record.month))
            .or_default()
            .push(record);
    }
    shards
}

fn group_annual_shards(records: Vec<AnnualTransaction>) -> HashMap<String, Vec<AnnualTransaction>> {
    let mut shards: HashMap<String, Vec<AnnualTransaction>> = HashMap::new();
    for record in records {
        shards
            .entry(annual_file_name(record.year))
            .or_default()
            .push(record);
    }
    shards
}
