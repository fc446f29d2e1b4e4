//! Trait abstractions for the controller's collaborators.
//!
//! The control loop only talks to these traits, so real HTTP endpoints and
//! the mocks in [`crate::mock`] are interchangeable.

use async_trait::async_trait;

use streetlight_types::{DeviceState, DeviceStatePatch, SensorReading};

use crate::cloud::CloudRecord;
use crate::error::Result;

/// Something that produces sensor readings.
///
/// # Example
///
/// ```ignore
/// use streetlight_core::{SensorSource, Result};
///
/// async fn sample<S: SensorSource>(source: &S) -> Result<()> {
///     let reading = source.read(None).await?;
///     println!("{} lux", reading.illuminance);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Produce the next reading.
    ///
    /// `previous` is the last reading the caller saw; sources that model a
    /// random walk continue from it, remote sources ignore it.
    async fn read(&self, previous: Option<&SensorReading>) -> Result<SensorReading>;
}

/// The remote device-state endpoint.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Fetch the current actuator state.
    async fn fetch_state(&self) -> Result<DeviceState>;

    /// Send a partial update and return the merged state.
    async fn update_state(&self, patch: &DeviceStatePatch) -> Result<DeviceState>;
}

/// Network reachability as reported by the platform.
#[async_trait]
pub trait Reachability: Send + Sync {
    /// Whether the network is connected and the internet is reachable.
    async fn is_reachable(&self) -> bool;
}

/// Remote store that accepts pushed readings.
#[async_trait]
pub trait CloudSink: Send + Sync {
    /// Append a record. Returns the key assigned by the remote store once
    /// the write has been acknowledged.
    async fn push(&self, record: &CloudRecord) -> Result<String>;
}
