//! The control loop.
//!
//! One tick, in order:
//!
//! 1. Acquire a reading from the remote sensor, or from the simulator when
//!    the sensor is unavailable or the controller is forced offline.
//!    When online, adopt the remote device state.
//! 2. Append it to the history window.
//! 3. In automatic mode, evaluate the lighting rules and apply the decision,
//!    pushing it to the device link when online and the state changed.
//! 4. Persist the reading.
//! 5. Start a cloud sync in the background unless forced offline or a
//!    previous sync is still pushing.
//! 6. Refresh the recent-log view.
//!
//! Statistics are then recomputed and a [`TickEvent`] is published.
//!
//! Ticks never overlap: the loop awaits each tick before waiting for the
//! next, missed ticks are skipped, and [`Controller::tick`] returns `None`
//! without doing anything while another tick holds the tick lock. A tick
//! never waits on the cloud, and each device request is cut off after one
//! tick period, so a slow collaborator cannot hold up sensing.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, warn};

use streetlight_core::{MotionTimer, StatisticsEngine, decide};
use streetlight_types::{
    DeviceState, DeviceStatePatch, RuleThresholds, SensorReading, ThresholdsPatch, ValueResult,
};

use crate::config::ThresholdsConfig;
use crate::state::{AppState, ReadingSource, TickEvent};
use crate::sync::{SyncOutcome, SyncReport};

/// What a single tick did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub tick: u64,
    pub source: ReadingSource,
    pub reading: SensorReading,
    pub online: bool,
    /// Rule decision, in automatic mode.
    pub decision: Option<DeviceState>,
    /// Device state after the tick.
    pub device: DeviceState,
    /// Row id of the persisted reading.
    pub stored_id: Option<i64>,
    /// Whether a background sync was started. Its outcome lands in
    /// `last_sync` when it finishes.
    pub sync_started: bool,
}

/// Drives the control loop over the shared [`AppState`].
#[derive(Clone)]
pub struct Controller {
    state: Arc<AppState>,
}

impl Controller {
    /// Create a new controller.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Start the periodic loop in the background.
    ///
    /// Returns `false` if it is already running. The motion timer is seeded
    /// with the start instant.
    pub async fn start(&self) -> bool {
        if !self.state.controller.try_start() {
            return false;
        }
        let generation = self.state.controller.generation();
        self.state.controller.reset_stop();
        self.state.control.write().await.motion = MotionTimer::new();

        let period = self.state.config.read().await.controller.tick_interval();
        let mut stop_rx = self.state.controller.subscribe_stop();
        let controller = self.clone();

        info!("Starting controller (tick every {:?})", period);

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        controller.tick().await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
                if controller.state.controller.generation() != generation {
                    break;
                }
            }

            info!("Controller stopped");
        });

        true
    }

    /// Signal the loop to stop. Returns `false` if it was not running.
    ///
    /// A tick already in progress runs to completion.
    pub fn stop(&self) -> bool {
        if !self.state.controller.is_running() {
            return false;
        }
        self.state.controller.signal_stop();
        true
    }

    /// Run one tick now.
    ///
    /// Returns `None` if another tick is still running.
    pub async fn tick(&self) -> Option<TickReport> {
        let Ok(_guard) = self.state.controller.tick_lock().try_lock() else {
            self.state.controller.record_skip();
            debug!("Previous tick still running, skipping");
            return None;
        };

        let (period, log_limit, trend_band) = {
            let config = self.state.config.read().await;
            (
                config.controller.tick_interval(),
                config.controller.log_limit,
                config.controller.trend_band,
            )
        };
        let (previous, forced_offline) = {
            let control = self.state.control.read().await;
            (control.current, control.forced_offline)
        };

        // 1. Acquire
        let (reading, source) = self.acquire(previous.as_ref(), forced_offline).await;
        let online = source == ReadingSource::Remote;
        let remote_device = if online {
            self.fetch_remote_device(period).await
        } else {
            None
        };

        // 2-3. History and rules
        let (decision, push) = {
            let mut control = self.state.control.write().await;
            control.online = online;
            control.current = Some(reading);
            control.history.push(reading);
            if let Some(device) = remote_device {
                control.device = device;
            }

            let decision = if control.auto_mode {
                let since_motion = control.motion.observe(&reading);
                Some(decide(&reading, since_motion, &control.thresholds))
            } else {
                None
            };
            let push = decision
                .filter(|target| online && *target != control.device)
                .filter(|_| self.state.links.device.is_some());
            if let Some(target) = decision {
                control.device = target;
            }
            (decision, push)
        };

        if let Some(target) = push
            && let Some(confirmed) = self
                .push_device(&DeviceStatePatch::from(target), period)
                .await
        {
            debug!("Device state pushed: {}", confirmed);
            self.state.control.write().await.device = confirmed;
        }

        // 4. Persist
        let stored_id = match self.state.store.lock().await.insert_reading(&reading) {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Failed to store reading: {}", e);
                None
            }
        };

        // 5. Sync
        let sync_started = !forced_offline && self.spawn_sync(log_limit);

        let (snapshot, device) = {
            let mut control = self.state.control.write().await;
            // 6. Recent logs, read under the control lock so a finishing
            // sync cannot interleave a stale view
            match self.state.store.lock().await.query_recent(log_limit) {
                Ok(logs) => control.logs = logs,
                Err(e) => error!("Failed to load recent readings: {}", e),
            }
            control.statistics = StatisticsEngine::new(trend_band).compute(control.history.iter());
            (control.snapshot(), control.device)
        };

        let tick = self.state.controller.record_tick();
        debug!(
            "Tick {}: {:.0} lx, {:.0}% visibility, motion={} ({:?}) -> {}",
            tick, reading.illuminance, reading.visibility, reading.motion, source, device
        );

        // Ignore send errors (no subscribers)
        let _ = self.state.events_tx.send(TickEvent {
            tick,
            source: Some(source),
            snapshot,
        });

        Some(TickReport {
            tick,
            source,
            reading,
            online,
            decision,
            device,
            stored_id,
            sync_started,
        })
    }

    async fn acquire(
        &self,
        previous: Option<&SensorReading>,
        forced_offline: bool,
    ) -> (SensorReading, ReadingSource) {
        if !forced_offline && let Some(sensor) = &self.state.links.sensor {
            match sensor.read(previous).await {
                Ok(reading) => {
                    let streak = self.state.controller.reset_remote_failures();
                    if streak > 0 {
                        info!("Remote sensor back after {} failed reads", streak);
                    }
                    return (reading, ReadingSource::Remote);
                }
                Err(e) => {
                    let failures = self.state.controller.record_remote_failure();
                    if failures <= 3 {
                        warn!(
                            "Remote sensor unavailable: {} (attempt {}), using simulation",
                            e, failures
                        );
                    } else if failures == 4 {
                        error!(
                            "Remote sensor unavailable after {} attempts, simulating silently",
                            failures
                        );
                    } else {
                        debug!("Remote sensor unavailable: {}", e);
                    }
                }
            }
        }

        (
            self.state.links.simulator.generate(previous),
            ReadingSource::Simulated,
        )
    }

    async fn fetch_remote_device(&self, limit: Duration) -> Option<DeviceState> {
        let device = self.state.links.device.as_ref()?;
        match timeout(limit, device.fetch_state()).await {
            Ok(Ok(state)) => Some(state),
            Ok(Err(e)) => {
                debug!("Failed to fetch device state: {}", e);
                None
            }
            Err(_) => {
                warn!("Device state fetch timed out after {:?}", limit);
                None
            }
        }
    }

    /// Send a patch to the device link; the confirmed state on success.
    async fn push_device(&self, patch: &DeviceStatePatch, limit: Duration) -> Option<DeviceState> {
        let device = self.state.links.device.as_ref()?;
        match timeout(limit, device.update_state(patch)).await {
            Ok(Ok(confirmed)) => Some(confirmed),
            Ok(Err(e)) => {
                warn!("Failed to push device update: {}", e);
                None
            }
            Err(_) => {
                warn!("Device update timed out after {:?}", limit);
                None
            }
        }
    }

    /// Start a sync task unless sync is disabled or a run is in flight.
    fn spawn_sync(&self, log_limit: u32) -> bool {
        let Some(sync) = &self.state.links.sync else {
            return false;
        };
        if sync.is_syncing() {
            debug!("Previous sync still running, not starting another");
            return false;
        }

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let Some(sync) = &state.links.sync else {
                return;
            };
            let outcome = sync.run(&state.store).await;
            // A run that lost the race leaves the winner to report
            if outcome != SyncOutcome::Busy {
                record_sync(&state, outcome, log_limit).await;
            }
        });
        true
    }

    /// Apply a manual device change.
    ///
    /// The patch is merged locally and, when online and not forced offline,
    /// pushed to the device link. In automatic mode the next tick may
    /// override it.
    pub async fn apply_manual(&self, patch: &DeviceStatePatch) -> ValueResult<DeviceState> {
        let (merged, remote) = {
            let mut control = self.state.control.write().await;
            let merged = control.device.merge(patch)?;
            control.device = merged;
            (merged, control.remote_allowed())
        };
        info!("Manual device update: {}", merged);

        if remote {
            let period = self.state.config.read().await.controller.tick_interval();
            if let Some(confirmed) = self.push_device(patch, period).await {
                self.state.control.write().await.device = confirmed;
                return Ok(confirmed);
            }
        }

        Ok(merged)
    }

    pub async fn set_auto_mode(&self, enabled: bool) {
        self.state.control.write().await.auto_mode = enabled;
        info!(
            "Automatic mode {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Force the controller offline (or back). While forced offline, no
    /// remote endpoint or cloud store is contacted.
    pub async fn set_forced_offline(&self, offline: bool) {
        let mut control = self.state.control.write().await;
        control.forced_offline = offline;
        if offline {
            control.online = false;
        }
        info!("Forced offline {}", if offline { "on" } else { "off" });
    }

    /// Apply a partial threshold update. Invalid values leave the current
    /// thresholds unchanged.
    pub async fn update_thresholds(&self, patch: &ThresholdsPatch) -> ValueResult<RuleThresholds> {
        let updated = {
            let mut control = self.state.control.write().await;
            let updated = control.thresholds.apply(patch)?;
            control.thresholds = updated;
            updated
        };
        self.state.config.write().await.thresholds = ThresholdsConfig::from(updated);
        info!(
            "Thresholds updated: lux_target={} visibility_limit={} motion_timeout={:?}",
            updated.lux_target(),
            updated.visibility_limit(),
            updated.motion_timeout()
        );
        Ok(updated)
    }

    /// Delete all stored readings and empty the window.
    pub async fn clear_history(&self) -> streetlight_store::Result<usize> {
        let _guard = self.state.controller.tick_lock().lock().await;
        let deleted = self.state.store.lock().await.clear()?;

        let mut control = self.state.control.write().await;
        control.history.clear();
        control.logs.clear();
        control.statistics = Default::default();
        info!("Cleared {} stored readings", deleted);
        Ok(deleted)
    }

    /// Run a sync now, outside the tick schedule.
    ///
    /// Returns `None` when sync is not configured. A `Busy` outcome leaves
    /// `last_sync` to the run already in flight.
    pub async fn sync_now(&self) -> Option<SyncOutcome> {
        let sync = self.state.links.sync.as_ref()?;
        let outcome = if self.state.control.read().await.forced_offline {
            SyncOutcome::Offline
        } else {
            sync.run(&self.state.store).await
        };
        if outcome != SyncOutcome::Busy {
            let log_limit = self.state.config.read().await.controller.log_limit;
            record_sync(&self.state, outcome.clone(), log_limit).await;
        }
        Some(outcome)
    }
}

/// Store a finished sync in `last_sync`, refreshing the recent logs when
/// readings changed state.
async fn record_sync(state: &AppState, outcome: SyncOutcome, log_limit: u32) {
    let mut control = state.control.write().await;
    if let SyncOutcome::Completed { pushed, .. } = outcome
        && pushed > 0
    {
        match state.store.lock().await.query_recent(log_limit) {
            Ok(logs) => control.logs = logs,
            Err(e) => error!("Failed to load recent readings: {}", e),
        }
    }
    control.last_sync = Some(SyncReport::new(outcome));
}
