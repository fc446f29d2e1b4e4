//! Application state shared across handlers and the control loop.
//!
//! # Locking
//!
//! The mutable control state (current reading, history window, device state
//! and thresholds) lives behind one `RwLock`, and the store behind a `Mutex`.
//! The control loop never holds either lock across a network call.
//!
//! # Broadcast Channel Behavior
//!
//! Each finished tick publishes a [`TickEvent`] on `events_tx`:
//!
//! - **Buffer size**: Configurable via `server.broadcast_buffer` (default: 100)
//! - **Message loss**: A subscriber that falls behind loses the oldest events
//! - **No blocking**: The control loop never waits for subscribers
//!
//! Dropping a receiver unsubscribes it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tracing::warn;

use streetlight_core::{
    DeviceLink, HistoryWindow, MotionTimer, RemoteClient, SensorSource, SimulatedSensor,
    SimulationConfig,
};
use streetlight_store::{Store, StoredReading};
use streetlight_types::timestamp::{from_unix_millis, to_unix_millis};
use streetlight_types::{DeviceState, RuleThresholds, SensorReading, Statistics};

use crate::config::Config;
use crate::sync::{SyncCoordinator, SyncReport};

/// Shared application state.
pub struct AppState {
    /// The local store.
    pub store: Mutex<Store>,
    /// Configuration (RwLock for runtime updates).
    pub config: RwLock<Config>,
    /// State owned by the control loop and read by the API.
    pub control: RwLock<ControlState>,
    /// Broadcast channel for per-tick updates.
    pub events_tx: broadcast::Sender<TickEvent>,
    /// Control loop lifecycle.
    pub controller: ControllerState,
    /// Sensor, device and cloud collaborators.
    pub links: Links,
}

impl AppState {
    /// Create state with a simulated sensor only.
    pub fn new(store: Store, config: Config) -> Arc<Self> {
        let links = Links::simulated(config.simulation.clone());
        Self::with_links(store, config, links)
    }

    /// Create state with explicit collaborators.
    pub fn with_links(store: Store, config: Config, links: Links) -> Arc<Self> {
        let buffer_size = config.server.broadcast_buffer.max(1);
        let (events_tx, _) = broadcast::channel(buffer_size);

        let thresholds = config.thresholds.to_thresholds().unwrap_or_else(|e| {
            warn!("Invalid thresholds in config ({}), using defaults", e);
            RuleThresholds::default()
        });
        let control = ControlState::new(thresholds, config.controller.auto_mode);

        Arc::new(Self {
            store: Mutex::new(store),
            config: RwLock::new(config),
            control: RwLock::new(control),
            events_tx,
            controller: ControllerState::new(),
            links,
        })
    }

    /// Subscribe to tick events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<TickEvent> {
        self.events_tx.subscribe()
    }

    /// Snapshot of the current control state.
    pub async fn snapshot(&self) -> Snapshot {
        self.control.read().await.snapshot()
    }
}

/// Collaborators the control loop talks to.
pub struct Links {
    /// Remote sensor endpoint, if configured.
    pub sensor: Option<Arc<dyn SensorSource>>,
    /// Remote device-state endpoint, if configured.
    pub device: Option<Arc<dyn DeviceLink>>,
    /// Fallback used whenever the remote sensor is unavailable.
    pub simulator: SimulatedSensor,
    /// Cloud synchronization, if configured.
    pub sync: Option<SyncCoordinator>,
}

impl Links {
    /// Simulation only: no remote endpoints and no cloud.
    pub fn simulated(simulation: SimulationConfig) -> Self {
        Self {
            sensor: None,
            device: None,
            simulator: SimulatedSensor::new(simulation),
            sync: None,
        }
    }

    /// Build the HTTP collaborators described by `config`.
    pub fn from_config(config: &Config) -> streetlight_core::Result<Self> {
        let mut links = Self::simulated(config.simulation.clone());

        if let Some(url) = config.remote.url.as_deref() {
            let client = Arc::new(RemoteClient::with_timeouts(
                url,
                std::time::Duration::from_millis(config.remote.sensor_timeout_ms),
                std::time::Duration::from_millis(config.remote.request_timeout_ms),
            )?);
            links = links.with_sensor(client.clone()).with_device(client);
        }

        if let Some(sync) = SyncCoordinator::from_config(&config.cloud)? {
            links = links.with_sync(sync);
        }

        Ok(links)
    }

    pub fn with_sensor(mut self, sensor: Arc<dyn SensorSource>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn with_device(mut self, device: Arc<dyn DeviceLink>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_sync(mut self, sync: SyncCoordinator) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn with_simulator(mut self, simulator: SimulatedSensor) -> Self {
        self.simulator = simulator;
        self
    }
}

/// Mutable state of the control loop.
#[derive(Debug)]
pub struct ControlState {
    /// Latest reading, remote or simulated.
    pub current: Option<SensorReading>,
    /// Actuator state as last decided, set manually or adopted from remote.
    pub device: DeviceState,
    /// Bounded window of recent readings.
    pub history: HistoryWindow,
    /// Statistics over `history`.
    pub statistics: Statistics,
    /// Active rule thresholds.
    pub thresholds: RuleThresholds,
    /// Whether the rule engine drives the lamp.
    pub auto_mode: bool,
    /// Whether the last remote sensor read succeeded.
    pub online: bool,
    /// Operator switch that suppresses all remote traffic.
    pub forced_offline: bool,
    /// Most recent stored readings, newest first.
    pub logs: Vec<StoredReading>,
    /// When motion was last observed.
    pub motion: MotionTimer,
    /// Result of the last sync run.
    pub last_sync: Option<SyncReport>,
}

impl ControlState {
    pub fn new(thresholds: RuleThresholds, auto_mode: bool) -> Self {
        Self {
            current: None,
            device: DeviceState::default(),
            history: HistoryWindow::default(),
            statistics: Statistics::default(),
            thresholds,
            auto_mode,
            online: false,
            forced_offline: false,
            logs: Vec::new(),
            motion: MotionTimer::new(),
            last_sync: None,
        }
    }

    /// Whether remote collaborators may be contacted.
    pub fn remote_allowed(&self) -> bool {
        self.online && !self.forced_offline
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            current_data: self.current,
            history: self.history.to_vec(),
            device_state: self.device,
            logs: self.logs.clone(),
            stats: self.statistics,
            thresholds: self.thresholds,
            is_auto_mode: self.auto_mode,
            is_online: self.online,
            is_simulated_offline: self.forced_offline,
            last_sync: self.last_sync.clone(),
        }
    }
}

/// Serializable view of [`ControlState`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub current_data: Option<SensorReading>,
    /// Oldest first.
    pub history: Vec<SensorReading>,
    pub device_state: DeviceState,
    /// Newest first.
    pub logs: Vec<StoredReading>,
    pub stats: Statistics,
    pub thresholds: RuleThresholds,
    pub is_auto_mode: bool,
    pub is_online: bool,
    pub is_simulated_offline: bool,
    pub last_sync: Option<SyncReport>,
}

/// Where a tick's reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingSource {
    Remote,
    Simulated,
}

/// Published after every tick, and once to each new WebSocket client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickEvent {
    /// Ticks completed since the service started.
    pub tick: u64,
    /// Source of this tick's reading; absent for an initial snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ReadingSource>,
    pub snapshot: Snapshot,
}

/// Lifecycle and counters of the control loop.
pub struct ControllerState {
    /// Whether the loop is currently running.
    running: AtomicBool,
    /// When the loop was started (Unix timestamp).
    started_at: AtomicU64,
    /// Channel to signal the loop to stop.
    stop_tx: watch::Sender<bool>,
    /// Receiver for stop signal (cloned by the loop task).
    stop_rx: watch::Receiver<bool>,
    /// Bumped on every start so a replaced loop task can exit.
    generation: AtomicU64,
    /// Held for the duration of a tick.
    tick_lock: Mutex<()>,
    ticks: AtomicU64,
    skipped_ticks: AtomicU64,
    /// Last completed tick (Unix milliseconds).
    last_tick_at: AtomicU64,
    consecutive_remote_failures: AtomicU32,
}

impl ControllerState {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            running: AtomicBool::new(false),
            started_at: AtomicU64::new(0),
            stop_tx,
            stop_rx,
            generation: AtomicU64::new(0),
            tick_lock: Mutex::new(()),
            ticks: AtomicU64::new(0),
            skipped_ticks: AtomicU64::new(0),
            last_tick_at: AtomicU64::new(0),
            consecutive_remote_failures: AtomicU32::new(0),
        }
    }

    /// Check if the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the loop as running. Returns `false` if it already was.
    pub fn try_start(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
        self.started_at.store(now, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Number of times the loop has been started.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Get the loop start time.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        let ts = self.started_at.load(Ordering::SeqCst);
        if ts == 0 {
            None
        } else {
            OffsetDateTime::from_unix_timestamp(ts as i64).ok()
        }
    }

    /// Get a receiver for the stop signal.
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// Signal the loop to stop.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
        self.running.store(false, Ordering::SeqCst);
    }

    /// Reset the stop signal (for restarting).
    pub fn reset_stop(&self) {
        let _ = self.stop_tx.send(false);
    }

    pub(crate) fn tick_lock(&self) -> &Mutex<()> {
        &self.tick_lock
    }

    /// Count a completed tick and return its number.
    pub(crate) fn record_tick(&self) -> u64 {
        let now = to_unix_millis(OffsetDateTime::now_utc());
        self.last_tick_at.store(now.max(0) as u64, Ordering::SeqCst);
        self.ticks.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn record_skip(&self) {
        self.skipped_ticks.fetch_add(1, Ordering::SeqCst);
    }

    /// Count a failed remote read; returns the consecutive count.
    pub(crate) fn record_remote_failure(&self) -> u32 {
        self.consecutive_remote_failures
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1)
    }

    /// Reset the failure streak; returns how long it was.
    pub(crate) fn reset_remote_failures(&self) -> u32 {
        self.consecutive_remote_failures.swap(0, Ordering::SeqCst)
    }

    /// Completed ticks.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Ticks skipped because the previous one was still running.
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped_ticks.load(Ordering::SeqCst)
    }

    pub fn last_tick_at(&self) -> Option<OffsetDateTime> {
        match self.last_tick_at.load(Ordering::SeqCst) {
            0 => None,
            ms => from_unix_millis(ms as i64),
        }
    }

    pub fn consecutive_remote_failures(&self) -> u32 {
        self.consecutive_remote_failures.load(Ordering::SeqCst)
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_state() -> Arc<AppState> {
        AppState::new(Store::open_in_memory().unwrap(), Config::default())
    }

    #[tokio::test]
    async fn test_app_state_new() {
        let state = create_test_state();
        let config = state.config.read().await;
        assert_eq!(config.server.bind, "127.0.0.1:8080");

        let control = state.control.read().await;
        assert!(control.auto_mode);
        assert!(!control.online);
        assert!(control.current.is_none());
        assert_eq!(control.thresholds, RuleThresholds::default());
        assert!(state.links.sensor.is_none());
        assert!(state.links.sync.is_none());
    }

    #[tokio::test]
    async fn test_app_state_uses_config_thresholds() {
        let mut config = Config::default();
        config.thresholds.lux_target = 2500.0;
        config.controller.auto_mode = false;
        let state = AppState::new(Store::open_in_memory().unwrap(), config);

        let control = state.control.read().await;
        assert_eq!(control.thresholds.lux_target(), 2500.0);
        assert!(!control.auto_mode);
    }

    #[tokio::test]
    async fn test_invalid_thresholds_fall_back_to_defaults() {
        let mut config = Config::default();
        config.thresholds.visibility_limit = 500.0;
        let state = AppState::new(Store::open_in_memory().unwrap(), config);
        assert_eq!(state.control.read().await.thresholds, RuleThresholds::default());
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe() {
        let state = create_test_state();
        assert_eq!(state.events_tx.receiver_count(), 0);

        let mut rx = state.subscribe();
        assert_eq!(state.events_tx.receiver_count(), 1);

        let event = TickEvent {
            tick: 1,
            source: Some(ReadingSource::Simulated),
            snapshot: state.snapshot().await,
        };
        state.events_tx.send(event).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.tick, 1);

        drop(rx);
        assert_eq!(state.events_tx.receiver_count(), 0);
    }

    #[test]
    fn test_links_from_default_config() {
        let links = Links::from_config(&Config::default()).unwrap();
        assert!(links.sensor.is_none());
        assert!(links.device.is_none());
        assert!(links.sync.is_none());
    }

    #[test]
    fn test_links_from_full_config() {
        let mut config = Config::default();
        config.remote.url = Some("http://127.0.0.1:3000/api".to_string());
        config.cloud.url = Some("https://db.example.com".to_string());
        let links = Links::from_config(&config).unwrap();
        assert!(links.sensor.is_some());
        assert!(links.device.is_some());
        assert!(links.sync.is_some());
    }

    #[test]
    fn test_links_reject_bad_remote_url() {
        let mut config = Config::default();
        config.remote.url = Some("192.168.0.136:3000".to_string());
        assert!(Links::from_config(&config).is_err());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut control = ControlState::new(RuleThresholds::default(), true);
        let reading = SensorReading::clamped(OffsetDateTime::UNIX_EPOCH, 8000.0, 20.0, false);
        control.current = Some(reading);
        control.history.push(reading);
        control.device = DeviceState::new(20, true);
        control.forced_offline = true;

        let json = serde_json::to_value(control.snapshot()).unwrap();
        assert_eq!(json["currentData"]["illuminance"], 8000.0);
        assert_eq!(json["history"].as_array().unwrap().len(), 1);
        assert_eq!(json["deviceState"]["ledBrightness"], 20);
        assert_eq!(json["deviceState"]["fogLights"], true);
        assert_eq!(json["stats"]["trend"], "STABLE");
        assert_eq!(json["thresholds"]["luxTarget"], 10_000.0);
        assert_eq!(json["isAutoMode"], true);
        assert_eq!(json["isOnline"], false);
        assert_eq!(json["isSimulatedOffline"], true);
        assert!(json["lastSync"].is_null());
    }

    #[test]
    fn test_remote_allowed() {
        let mut control = ControlState::new(RuleThresholds::default(), true);
        assert!(!control.remote_allowed());
        control.online = true;
        assert!(control.remote_allowed());
        control.forced_offline = true;
        assert!(!control.remote_allowed());
    }

    #[test]
    fn test_controller_state() {
        let controller = ControllerState::new();
        assert!(!controller.is_running());
        assert!(controller.started_at().is_none());

        assert!(controller.try_start());
        assert!(controller.is_running());
        assert!(controller.started_at().is_some());
        assert!(!controller.try_start());
        assert_eq!(controller.generation(), 1);

        controller.signal_stop();
        assert!(!controller.is_running());
        assert!(controller.try_start());
        assert_eq!(controller.generation(), 2);
    }

    #[test]
    fn test_controller_state_stop_and_reset() {
        let controller = ControllerState::default();
        let rx = controller.subscribe_stop();
        assert!(!*rx.borrow());

        controller.signal_stop();
        assert!(*rx.borrow());

        controller.reset_stop();
        assert!(!*rx.borrow());
    }

    #[test]
    fn test_controller_counters() {
        let controller = ControllerState::new();
        assert_eq!(controller.tick_count(), 0);
        assert!(controller.last_tick_at().is_none());

        assert_eq!(controller.record_tick(), 1);
        assert_eq!(controller.record_tick(), 2);
        assert!(controller.last_tick_at().is_some());

        controller.record_skip();
        assert_eq!(controller.skipped_ticks(), 1);

        assert_eq!(controller.record_remote_failure(), 1);
        assert_eq!(controller.record_remote_failure(), 2);
        assert_eq!(controller.consecutive_remote_failures(), 2);
        assert_eq!(controller.reset_remote_failures(), 2);
        assert_eq!(controller.consecutive_remote_failures(), 0);
    }

    #[test]
    fn test_tick_event_serialization() {
        let control = ControlState::new(RuleThresholds::default(), false);
        let event = TickEvent {
            tick: 0,
            source: None,
            snapshot: control.snapshot(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["tick"], 0);
        assert!(json.get("source").is_none());
        assert_eq!(json["snapshot"]["isAutoMode"], false);
    }
}
