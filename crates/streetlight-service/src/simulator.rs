//! Stand-in for the streetlight's own HTTP endpoint.
//!
//! Serves the same resources the controller's [`RemoteClient`] talks to,
//! backed by a random walk, so the whole loop can run on one machine:
//!
//! - `GET /api/sensors`: the current measurement, stamped with the time of
//!   the request
//! - `GET /api/devices`: the actuator state
//! - `POST /api/devices`: merge a partial update and return the new state
//!
//! The measurement advances every [`DEFAULT_STEP_INTERVAL`], starting from
//! full daylight and clear air.
//!
//! [`RemoteClient`]: streetlight_core::RemoteClient

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    routing::get,
};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use streetlight_core::{SensorPayload, SimulatedSensor, SimulationConfig};
use streetlight_types::timestamp::to_unix_millis;
use streetlight_types::{DeviceState, DeviceStatePatch, SensorReading};

use crate::api::AppError;

/// How often the simulated measurement moves.
pub const DEFAULT_STEP_INTERVAL: Duration = Duration::from_secs(2);

/// Measurement and actuator state of the simulated streetlight.
#[derive(Debug)]
pub struct SimulatorState {
    walk: SimulatedSensor,
    reading: RwLock<SensorReading>,
    device: RwLock<DeviceState>,
}

impl SimulatorState {
    /// Start at 50000 lux, 100% visibility, no motion, lamps off.
    pub fn new() -> Arc<Self> {
        Self::with_walk(SimulatedSensor::new(Self::walk_config()))
    }

    /// Same starting point with a caller-supplied walk.
    pub fn with_walk(walk: SimulatedSensor) -> Arc<Self> {
        let start = SensorReading::clamped(
            OffsetDateTime::now_utc(),
            walk.config().baseline_illuminance,
            walk.config().baseline_visibility,
            false,
        );
        Arc::new(Self {
            walk,
            reading: RwLock::new(start),
            device: RwLock::new(DeviceState::default()),
        })
    }

    /// Walk parameters: the controller defaults, starting from clear air.
    pub fn walk_config() -> SimulationConfig {
        SimulationConfig {
            baseline_visibility: 100.0,
            ..SimulationConfig::default()
        }
    }

    pub async fn reading(&self) -> SensorReading {
        *self.reading.read().await
    }

    pub async fn device(&self) -> DeviceState {
        *self.device.read().await
    }

    /// Advance the measurement by one step.
    pub async fn step(&self) -> SensorReading {
        let mut reading = self.reading.write().await;
        *reading = self.walk.generate(Some(&reading));
        *reading
    }

    /// Merge a partial actuator update.
    pub async fn update_device(&self, patch: &DeviceStatePatch) -> Result<DeviceState, AppError> {
        let mut device = self.device.write().await;
        *device = device.merge(patch)?;
        Ok(*device)
    }

    /// Step the measurement every `period` until the task is aborted.
    pub fn spawn_walk(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; keep the starting reading
            timer.tick().await;
            loop {
                timer.tick().await;
                let reading = state.step().await;
                debug!(
                    "Simulated reading: {:.0} lx, {:.0}% visibility, motion={}",
                    reading.illuminance, reading.visibility, reading.motion
                );
            }
        })
    }
}

/// Create the simulator router.
pub fn router() -> Router<Arc<SimulatorState>> {
    Router::new()
        .route("/api/sensors", get(get_sensors))
        .route("/api/devices", get(get_devices).post(post_devices))
}

/// Current measurement, with a fresh id and timestamp.
async fn get_sensors(State(state): State<Arc<SimulatorState>>) -> Json<SensorPayload> {
    let now = OffsetDateTime::now_utc();
    let reading = SensorReading {
        timestamp: now,
        ..state.reading().await
    };
    let mut payload = SensorPayload::from_reading(&reading);
    payload.id = Some(to_unix_millis(now));
    Json(payload)
}

async fn get_devices(State(state): State<Arc<SimulatorState>>) -> Json<DeviceState> {
    Json(state.device().await)
}

async fn post_devices(
    State(state): State<Arc<SimulatorState>>,
    Json(patch): Json<DeviceStatePatch>,
) -> Result<Json<DeviceState>, AppError> {
    let device = state.update_device(&patch).await?;
    debug!("Simulated device updated: {}", device);
    Ok(Json(device))
}
