//! Mock collaborators for testing.
//!
//! These implement the traits in [`crate::traits`] without any network I/O,
//! so the control loop and the sync coordinator can be exercised in unit
//! tests.
//!
//! # Features
//!
//! - **Failure injection**: make reads, pushes or device updates fail
//! - **Per-record failures**: fail cloud pushes for specific row ids
//! - **Latency simulation**: delay cloud pushes and device requests to test
//!   overlapping syncs and stalled endpoints
//! - **Call recording**: inspect what was pushed or patched

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use streetlight_types::{DeviceState, DeviceStatePatch, SensorReading};

use crate::cloud::CloudRecord;
use crate::error::{Error, Result};
use crate::traits::{CloudSink, DeviceLink, Reachability, SensorSource};

fn mock_unavailable(what: &str) -> Error {
    Error::Unavailable {
        url: format!("mock://{what}"),
        reason: "Mock failure".to_string(),
    }
}

/// A sensor that returns a fixed reading.
///
/// # Example
///
/// ```
/// use streetlight_core::{MockSensor, SensorSource};
///
/// #[tokio::main]
/// async fn main() {
///     let sensor = MockSensor::new(8000.0, 20.0, false);
///     let reading = sensor.read(None).await.unwrap();
///     assert_eq!(reading.illuminance, 8000.0);
///
///     sensor.set_should_fail(true);
///     assert!(sensor.read(None).await.is_err());
/// }
/// ```
#[derive(Debug)]
pub struct MockSensor {
    reading: RwLock<SensorReading>,
    should_fail: AtomicBool,
    read_count: AtomicU32,
}

impl MockSensor {
    pub fn new(illuminance: f64, visibility: f64, motion: bool) -> Self {
        Self {
            reading: RwLock::new(SensorReading::clamped(
                OffsetDateTime::now_utc(),
                illuminance,
                visibility,
                motion,
            )),
            should_fail: AtomicBool::new(false),
            read_count: AtomicU32::new(0),
        }
    }

    /// Replace the reading returned by subsequent reads.
    pub async fn set_reading(&self, illuminance: f64, visibility: f64, motion: bool) {
        *self.reading.write().await =
            SensorReading::clamped(OffsetDateTime::now_utc(), illuminance, visibility, motion);
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SensorSource for MockSensor {
    async fn read(&self, _previous: Option<&SensorReading>) -> Result<SensorReading> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(mock_unavailable("sensors"));
        }
        let mut reading = *self.reading.read().await;
        reading.timestamp = OffsetDateTime::now_utc();
        Ok(reading)
    }
}

/// A device endpoint that keeps state in memory and merges patches.
#[derive(Debug, Default)]
pub struct MockDeviceLink {
    state: RwLock<DeviceState>,
    patches: RwLock<Vec<DeviceStatePatch>>,
    should_fail: AtomicBool,
    fail_updates: AtomicBool,
    /// Simulated request latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
}

impl MockDeviceLink {
    pub fn new(state: DeviceState) -> Self {
        Self {
            state: RwLock::new(state),
            ..Default::default()
        }
    }

    /// Fail every request.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Fail only updates; fetches keep working.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::Relaxed);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    async fn delay(&self) {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
    }

    /// Overwrite the remote state, as if changed by another client.
    pub async fn set_state(&self, state: DeviceState) {
        *self.state.write().await = state;
    }

    pub async fn state(&self) -> DeviceState {
        *self.state.read().await
    }

    /// Patches received so far, in order.
    pub async fn patches(&self) -> Vec<DeviceStatePatch> {
        self.patches.read().await.clone()
    }
}

#[async_trait]
impl DeviceLink for MockDeviceLink {
    async fn fetch_state(&self) -> Result<DeviceState> {
        self.delay().await;
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(mock_unavailable("devices"));
        }
        Ok(*self.state.read().await)
    }

    async fn update_state(&self, patch: &DeviceStatePatch) -> Result<DeviceState> {
        self.delay().await;
        if self.should_fail.load(Ordering::Relaxed) || self.fail_updates.load(Ordering::Relaxed) {
            return Err(mock_unavailable("devices"));
        }
        self.patches.write().await.push(*patch);
        let mut state = self.state.write().await;
        *state = state.merge(patch)?;
        Ok(*state)
    }
}

/// A cloud store that records pushes in memory.
///
/// # Example
///
/// ```
/// use streetlight_core::{CloudRecord, CloudSink, MockCloudSink};
/// use streetlight_types::SensorReading;
/// use time::OffsetDateTime;
///
/// #[tokio::main]
/// async fn main() {
///     let sink = MockCloudSink::new();
///     sink.fail_ids([2]).await;
///
///     let reading = SensorReading::clamped(OffsetDateTime::now_utc(), 1.0, 1.0, false);
///     assert!(sink.push(&CloudRecord::new(1, reading)).await.is_ok());
///     assert!(sink.push(&CloudRecord::new(2, reading)).await.is_err());
///     assert_eq!(sink.pushed_ids().await, vec![1]);
/// }
/// ```
#[derive(Debug, Default)]
pub struct MockCloudSink {
    pushed: RwLock<Vec<CloudRecord>>,
    fail_ids: RwLock<HashSet<i64>>,
    should_fail: AtomicBool,
    attempts: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    /// Simulated push latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
}

impl MockCloudSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail pushes for these record ids.
    pub async fn fail_ids(&self, ids: impl IntoIterator<Item = i64>) {
        self.fail_ids.write().await.extend(ids);
    }

    /// Accept every record again.
    pub async fn clear_failures(&self) {
        self.fail_ids.write().await.clear();
        self.should_fail.store(false, Ordering::Relaxed);
    }

    /// Fail every push.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of push attempts, successful or not.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Highest number of pushes that were running at the same time.
    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::Relaxed)
    }

    /// Ids of acknowledged records, sorted.
    pub async fn pushed_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.pushed.read().await.iter().map(|r| r.id).collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl CloudSink for MockCloudSink {
    async fn push(&self, record: &CloudRecord) -> Result<String> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let result = self.push_inner(record).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl MockCloudSink {
    async fn push_inner(&self, record: &CloudRecord) -> Result<String> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.should_fail.load(Ordering::Relaxed)
            || self.fail_ids.read().await.contains(&record.id)
        {
            return Err(Error::Api {
                url: "mock://cloud".to_string(),
                status: 503,
                message: format!("rejected record {}", record.id),
            });
        }

        self.pushed.write().await.push(record.clone());
        Ok(format!("mock-{}", record.id))
    }
}

/// Reachability that can be toggled.
#[derive(Debug)]
pub struct MockReachability {
    reachable: AtomicBool,
    checks: AtomicU32,
}

impl MockReachability {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            checks: AtomicU32::new(0),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Relaxed);
    }

    /// Number of reachability checks performed.
    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Reachability for MockReachability {
    async fn is_reachable(&self) -> bool {
        self.checks.fetch_add(1, Ordering::Relaxed);
        self.reachable.load(Ordering::Relaxed)
    }
}
