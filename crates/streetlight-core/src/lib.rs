//! Core library for the streetlight controller.
//!
//! This crate holds everything the control loop needs apart from storage and
//! the service shell: where readings come from, how they are summarized, which
//! lighting rule applies, and how records reach the cloud.
//!
//! # Features
//!
//! - **Sensor sources**: a remote HTTP sensor with a short timeout and a
//!   random-walk simulator used as fallback
//! - **History window**: bounded FIFO of the latest readings
//! - **Statistics**: mean, median and trend over the window
//! - **Rules**: pure brightness/fog decision and a motion timer
//! - **Collaborators**: device link, cloud sink and reachability traits with
//!   HTTP implementations and mocks
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//! use streetlight_core::{HistoryWindow, SimulatedSensor, SimulationConfig, StatisticsEngine};
//! use streetlight_core::rules::decide;
//! use streetlight_types::RuleThresholds;
//!
//! let sensor = SimulatedSensor::seeded(SimulationConfig::default(), 1);
//! let mut window = HistoryWindow::default();
//!
//! let mut previous = None;
//! for _ in 0..10 {
//!     let reading = sensor.generate(previous.as_ref());
//!     window.push(reading);
//!     previous = Some(reading);
//! }
//!
//! let stats = StatisticsEngine::default().compute(window.iter());
//! assert_eq!(stats.count, 10);
//!
//! let latest = window.latest().unwrap();
//! let state = decide(latest, Duration::from_secs(60), &RuleThresholds::default());
//! assert_eq!(state.led_brightness, 0); // ~50000 lux is daylight
//! ```

pub mod cloud;
pub mod error;
pub mod history;
pub mod mock;
pub mod remote;
pub mod rules;
pub mod sensor;
pub mod statistics;
pub mod traits;

#[cfg(test)]
mod testutil;

pub use cloud::{CloudRecord, HttpCloudSink, HttpProbe};
pub use error::{Error, Result};
pub use history::{DEFAULT_HISTORY_CAPACITY, HistoryWindow};
pub use mock::{MockCloudSink, MockDeviceLink, MockReachability, MockSensor};
pub use remote::{RemoteClient, SensorPayload};
pub use rules::{LampMode, MotionTimer, decide};
pub use sensor::{SimulatedSensor, SimulationConfig};
pub use statistics::{DEFAULT_TREND_BAND, StatisticsEngine};
pub use traits::{CloudSink, DeviceLink, Reachability, SensorSource};

// Re-export the domain types so downstream crates need a single import.
pub use streetlight_types;
