//! Debounced sync scheduling
//!
//! Record-store mutations arrive in bursts; each one re-arms a quiet-period
//! timer so a burst costs one network round trip, not one per edit. Losing
//! foreground visibility flushes immediately, cancelling any pending timer.
//! Cancellation is a generation counter: a timer only fires if no newer
//! mutation (or flush) superseded it while it slept.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::auth::CredentialProvider;
use crate::storage::BlobStore;

use super::engine::{SyncEngine, SyncError, SyncOutcome};

/// Quiet period after the last mutation before a debounced pass runs.
const DEBOUNCE: Duration = Duration::from_secs(30);

/// Schedules sync passes around a [`SyncEngine`].
pub struct SyncScheduler<B, C> {
    engine: Arc<SyncEngine<B, C>>,
    debounce: Duration,
    generation: Arc<AtomicU64>,
    due: Arc<Notify>,
}

impl<B, C> SyncScheduler<B, C>
where
    B: BlobStore + Send + Sync + 'static,
    C: CredentialProvider + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(engine: Arc<SyncEngine<B, C>>) -> Self {
        Self {
            engine,
            debounce: DEBOUNCE,
            generation: Arc::new(AtomicU64::new(0)),
            due: Arc::new(Notify::new()),
        }
    }

    /// Override the quiet period (tests use short durations).
    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Note a record-store mutation; (re)arms the debounce timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn note_mutation(&self) {
        let armed_at = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        let due = Arc::clone(&self.due);
        let debounce = self.debounce;

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if generation.load(Ordering::SeqCst) == armed_at {
                due.notify_one();
            }
        });
    }

    /// Sync immediately, cancelling any pending debounce timer.
    ///
    /// Client shells call this when the app loses foreground visibility.
    pub async fn flush(&self) -> Result<SyncOutcome, SyncError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.engine.sync().await
    }

    /// Drive debounced passes; spawn this once alongside the engine.
    ///
    /// Never returns; each elapsed timer triggers one pass. Errors are
    /// reported through the engine's status and retried by the next
    /// scheduled trigger, so they are only logged here.
    pub async fn run(&self) {
        loop {
            self.due.notified().await;
            if let Err(error) = self.engine.sync().await {
                tracing::warn!("Debounced sync failed: {error}");
            }
        }
    }
}
