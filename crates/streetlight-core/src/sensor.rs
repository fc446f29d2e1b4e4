//! Simulated sensor source.
//!
//! Produces a bounded random walk: each measurement is the previous value
//! plus uniform noise, clamped to its valid range. Motion is an independent
//! Bernoulli draw. Nothing is persisted between restarts; without a previous
//! reading the walk starts from a fixed baseline.
//!
//! # Example
//!
//! ```
//! use streetlight_core::{SimulatedSensor, SimulationConfig};
//!
//! let sensor = SimulatedSensor::seeded(SimulationConfig::default(), 7);
//! let first = sensor.generate(None);
//! let second = sensor.generate(Some(&first));
//! assert!((second.illuminance - first.illuminance).abs() <= 2000.0);
//! ```

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use streetlight_types::{MAX_ILLUMINANCE, MAX_VISIBILITY, SensorReading};

use crate::error::Result;
use crate::traits::SensorSource;

/// Parameters of the simulated random walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Maximum illuminance change per reading (lux).
    pub lux_step: f64,
    /// Maximum visibility change per reading (percentage points).
    pub visibility_step: f64,
    /// Probability that a reading reports motion.
    pub motion_probability: f64,
    /// Illuminance used when there is no previous reading.
    pub baseline_illuminance: f64,
    /// Visibility used when there is no previous reading.
    pub baseline_visibility: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            lux_step: 2000.0,
            visibility_step: 5.0,
            motion_probability: 0.3,
            baseline_illuminance: 50_000.0,
            baseline_visibility: 90.0,
        }
    }
}

impl SimulationConfig {
    /// Clamp every parameter into a usable range.
    fn normalized(mut self) -> Self {
        self.lux_step = non_negative(self.lux_step);
        self.visibility_step = non_negative(self.visibility_step);
        self.motion_probability = if self.motion_probability.is_finite() {
            self.motion_probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let defaults = Self::default();
        self.baseline_illuminance = in_range(
            self.baseline_illuminance,
            MAX_ILLUMINANCE,
            defaults.baseline_illuminance,
        );
        self.baseline_visibility = in_range(
            self.baseline_visibility,
            MAX_VISIBILITY,
            defaults.baseline_visibility,
        );
        self
    }
}

/// Clamp into `[0, max]`; non-finite values fall back to `default`.
fn in_range(value: f64, max: f64, default: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        default
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() { value.abs() } else { 0.0 }
}

/// Random-walk sensor used when no remote sensor is available.
pub struct SimulatedSensor {
    config: SimulationConfig,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for SimulatedSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedSensor")
            .field("config", &self.config)
            .finish()
    }
}

impl SimulatedSensor {
    /// Create a simulator seeded from the operating system.
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config: config.normalized(),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Create a deterministic simulator (for tests and replays).
    pub fn seeded(config: SimulationConfig, seed: u64) -> Self {
        Self {
            config: config.normalized(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Generate the next reading from `previous` (or the baseline).
    pub fn generate(&self, previous: Option<&SensorReading>) -> SensorReading {
        let (lux, visibility) = previous
            .map(|p| (p.illuminance, p.visibility))
            .unwrap_or((
                self.config.baseline_illuminance,
                self.config.baseline_visibility,
            ));

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let lux = step(&mut *rng, lux, self.config.lux_step, MAX_ILLUMINANCE);
        let visibility = step(
            &mut *rng,
            visibility,
            self.config.visibility_step,
            MAX_VISIBILITY,
        );
        let motion = rng.random_bool(self.config.motion_probability);

        SensorReading::clamped(OffsetDateTime::now_utc(), lux, visibility, motion)
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

/// One bounded random-walk step, floored to whole units.
fn step<R: Rng + ?Sized>(rng: &mut R, value: f64, max_step: f64, max: f64) -> f64 {
    let delta = if max_step > 0.0 {
        rng.random_range(-max_step..max_step)
    } else {
        0.0
    };
    (value + delta).clamp(0.0, max).floor()
}

#[async_trait]
impl SensorSource for SimulatedSensor {
    async fn read(&self, previous: Option<&SensorReading>) -> Result<SensorReading> {
        Ok(self.generate(previous))
    }
}
