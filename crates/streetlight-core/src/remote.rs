//! HTTP client for the remote sensor/device endpoint.
//!
//! The endpoint exposes two resources under a base URL:
//!
//! - `GET {base}/sensors`: the latest measurement
//! - `GET {base}/devices`, `POST {base}/devices`: actuator state, with POST
//!   merging a partial update and returning the new state
//!
//! Sensor reads use a short timeout (1 s by default) so a dead endpoint never
//! stalls the control loop; the caller falls back to the simulator instead.
//!
//! # Example
//!
//! ```no_run
//! use streetlight_core::RemoteClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RemoteClient::new("http://192.168.1.50:3000/api")?;
//! let reading = client.fetch_sensor_data().await?;
//! println!("{} lux", reading.illuminance);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use streetlight_types::timestamp::{from_unix_millis, to_unix_millis};
use streetlight_types::{DeviceState, DeviceStatePatch, SensorReading};

use crate::error::{Error, Result};
use crate::traits::{DeviceLink, SensorSource};

/// Default timeout for sensor reads.
pub const DEFAULT_SENSOR_TIMEOUT: Duration = Duration::from_secs(1);

/// Default timeout for device-state requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Sensor body as served by the remote endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorPayload {
    /// Row id on the remote side, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Capture time in Unix milliseconds.
    pub timestamp: i64,
    pub illuminance: f64,
    pub visibility: f64,
    pub motion: bool,
    /// Remote sync marker; carried on the wire but ignored locally.
    #[serde(default)]
    pub is_synced: u8,
}

impl SensorPayload {
    /// Build the wire form of a reading.
    pub fn from_reading(reading: &SensorReading) -> Self {
        Self {
            id: None,
            timestamp: to_unix_millis(reading.timestamp),
            illuminance: reading.illuminance,
            visibility: reading.visibility,
            motion: reading.motion,
            is_synced: 1,
        }
    }

    /// Convert to a validated reading.
    pub fn to_reading(&self) -> std::result::Result<SensorReading, String> {
        let timestamp = from_unix_millis(self.timestamp)
            .ok_or_else(|| format!("timestamp out of range: {}", self.timestamp))?;
        let reading = SensorReading {
            timestamp,
            illuminance: self.illuminance,
            visibility: self.visibility,
            motion: self.motion,
        };
        reading.validate().map_err(|e| e.to_string())?;
        Ok(reading)
    }
}

/// Client for the remote sensor and device endpoints.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: Client,
    base_url: String,
    sensor_timeout: Duration,
    request_timeout: Duration,
}

impl RemoteClient {
    /// Create a client with the default timeouts.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the endpoint (e.g., "http://localhost:3000/api")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeouts(base_url, DEFAULT_SENSOR_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with custom timeouts.
    pub fn with_timeouts(
        base_url: &str,
        sensor_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        // Normalize URL (remove trailing slash)
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::InvalidUrl(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::InvalidUrl(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            sensor_timeout,
            request_timeout,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the latest measurement.
    pub async fn fetch_sensor_data(&self) -> Result<SensorReading> {
        let url = format!("{}/sensors", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.sensor_timeout)
            .send()
            .await
            .map_err(|e| Error::from_request(&url, self.sensor_timeout, e))?;

        let payload: SensorPayload = self
            .handle_response(&url, self.sensor_timeout, response)
            .await?;
        payload
            .to_reading()
            .map_err(|message| Error::InvalidData { url, message })
    }

    /// Fetch the current actuator state.
    pub async fn fetch_device_state(&self) -> Result<DeviceState> {
        let url = format!("{}/devices", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::from_request(&url, self.request_timeout, e))?;

        let state: DeviceState = self
            .handle_response(&url, self.request_timeout, response)
            .await?;
        validated(url, state)
    }

    /// Send a partial update; the endpoint merges it and returns the result.
    pub async fn update_device_state(&self, patch: &DeviceStatePatch) -> Result<DeviceState> {
        let url = format!("{}/devices", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(patch)
            .send()
            .await
            .map_err(|e| Error::from_request(&url, self.request_timeout, e))?;

        let state: DeviceState = self
            .handle_response(&url, self.request_timeout, response)
            .await?;
        validated(url, state)
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        url: &str,
        timeout: Duration,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::from_request(url, timeout, e))
        } else {
            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or_else(|| status.to_string());

            Err(Error::Api {
                url: url.to_string(),
                status: status.as_u16(),
                message,
            })
        }
    }
}

fn validated(url: String, state: DeviceState) -> Result<DeviceState> {
    state
        .validate()
        .map_err(|e| Error::InvalidData {
            url,
            message: e.to_string(),
        })
        .map(|()| state)
}

#[async_trait]
impl SensorSource for RemoteClient {
    async fn read(&self, _previous: Option<&SensorReading>) -> Result<SensorReading> {
        self.fetch_sensor_data().await
    }
}

#[async_trait]
impl DeviceLink for RemoteClient {
    async fn fetch_state(&self) -> Result<DeviceState> {
        self.fetch_device_state().await
    }

    async fn update_state(&self, patch: &DeviceStatePatch) -> Result<DeviceState> {
        self.update_device_state(patch).await
    }
}
