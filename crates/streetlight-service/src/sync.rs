//! Cloud synchronization of locally stored readings.
//!
//! A sync run checks reachability, pushes the oldest unsynced readings to the
//! cloud store and marks exactly the acknowledged ones as synced. Failed
//! pushes stay unsynced and are retried by the next run.
//!
//! One run takes at most [`DEFAULT_BATCH_SIZE`] readings and keeps at most
//! [`DEFAULT_MAX_IN_FLIGHT`] pushes open at once; a larger backlog drains over
//! several runs.
//!
//! Only one run is in flight at a time; a run requested while another is
//! pushing returns [`SyncOutcome::Busy`] immediately.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use streetlight_core::{CloudRecord, CloudSink, HttpCloudSink, HttpProbe, Reachability};
use streetlight_store::Store;

use crate::config::CloudConfig;

/// Readings taken from the store by one run.
pub const DEFAULT_BATCH_SIZE: u32 = 200;
/// Pushes open at the same time.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Result of a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Another run was already in flight.
    Busy,
    /// The network was not reachable; nothing was touched.
    Offline,
    /// Pushes were attempted. `failed` readings stay unsynced.
    Completed { pushed: usize, failed: usize },
    /// The local store could not be read or updated.
    Failed { message: String },
}

impl SyncOutcome {
    /// Whether the run counts as a success.
    ///
    /// A partial push failure still succeeds: the acknowledged readings were
    /// marked and the rest are retried later.
    pub fn succeeded(&self) -> bool {
        matches!(self, SyncOutcome::Completed { .. })
    }
}

/// A finished sync run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    #[serde(flatten)]
    pub outcome: SyncOutcome,
    /// When the run finished.
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
}

impl SyncReport {
    pub fn new(outcome: SyncOutcome) -> Self {
        Self {
            outcome,
            finished_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Pushes unsynced readings to a [`CloudSink`] when [`Reachability`] allows.
pub struct SyncCoordinator {
    sink: Arc<dyn CloudSink>,
    reachability: Arc<dyn Reachability>,
    in_flight: Mutex<()>,
    batch_size: u32,
    max_in_flight: usize,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("in_flight", &self.is_syncing())
            .field("batch_size", &self.batch_size)
            .field("max_in_flight", &self.max_in_flight)
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    /// Create a coordinator from its two collaborators.
    pub fn new(sink: Arc<dyn CloudSink>, reachability: Arc<dyn Reachability>) -> Self {
        Self {
            sink,
            reachability,
            in_flight: Mutex::new(()),
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Limit how many readings one run takes and how many pushes overlap.
    ///
    /// Zero values are raised to 1.
    pub fn with_limits(mut self, batch_size: u32, max_in_flight: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Build the HTTP coordinator described by `config`.
    ///
    /// Returns `Ok(None)` when no cloud URL is configured.
    pub fn from_config(config: &CloudConfig) -> streetlight_core::Result<Option<Self>> {
        let Some(url) = config.url.as_deref() else {
            return Ok(None);
        };
        let timeout = std::time::Duration::from_millis(config.timeout_ms);
        let sink = HttpCloudSink::with_timeout(url, &config.collection, config.auth.clone(), timeout)?;
        let probe_url = config.effective_probe_url().unwrap_or(url);
        let probe = HttpProbe::new(probe_url)?;
        info!("Cloud sync enabled: {}/{}", sink.base_url(), config.collection);
        Ok(Some(
            Self::new(Arc::new(sink), Arc::new(probe))
                .with_limits(config.batch_size, config.max_concurrent_pushes),
        ))
    }

    /// Whether a run is currently in flight.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Run one sync and report how it went.
    ///
    /// The store lock is only held while reading the batch and while
    /// marking; pushes run without it.
    pub async fn run(&self, store: &Mutex<Store>) -> SyncOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("Sync already in flight, skipping");
            return SyncOutcome::Busy;
        };

        if !self.reachability.is_reachable().await {
            debug!("Network unreachable, sync deferred");
            return SyncOutcome::Offline;
        }

        let pending = match store.lock().await.query_unsynced_batch(self.batch_size) {
            Ok(pending) => pending,
            Err(e) => {
                error!("Failed to read unsynced readings: {}", e);
                return SyncOutcome::Failed {
                    message: e.to_string(),
                };
            }
        };

        if pending.is_empty() {
            return SyncOutcome::Completed {
                pushed: 0,
                failed: 0,
            };
        }

        let results: Vec<_> = stream::iter(pending)
            .map(|stored| async move {
                let record = CloudRecord::new(stored.id, stored.to_reading());
                (record.id, self.sink.push(&record).await)
            })
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        let mut acknowledged = Vec::with_capacity(results.len());
        let mut failed = 0;
        for (id, result) in results {
            match result {
                Ok(key) => {
                    debug!("Reading {} stored in cloud as {}", id, key);
                    acknowledged.push(id);
                }
                Err(e) => {
                    debug!("Failed to push reading {}: {}", id, e);
                    failed += 1;
                }
            }
        }

        if !acknowledged.is_empty()
            && let Err(e) = store.lock().await.mark_synced(&acknowledged)
        {
            error!("Failed to mark {} readings as synced: {}", acknowledged.len(), e);
            return SyncOutcome::Failed {
                message: e.to_string(),
            };
        }

        if failed > 0 {
            warn!(
                "Partial sync: {} pushed, {} failed (will retry)",
                acknowledged.len(),
                failed
            );
        } else {
            info!("Synced {} readings to the cloud", acknowledged.len());
        }

        SyncOutcome::Completed {
            pushed: acknowledged.len(),
            failed,
        }
    }

    /// Run one sync; `true` on (possibly partial) success.
    pub async fn sync(&self, store: &Mutex<Store>) -> bool {
        self.run(store).await.succeeded()
    }
}
