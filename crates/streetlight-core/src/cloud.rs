//! Cloud store and reachability collaborators over HTTP.
//!
//! The cloud store is a push-style append API: each record is POSTed to
//! `{url}/{collection}.json` and the store answers with the key it assigned,
//! `{"name": "<key>"}`. A record counts as synced only once that
//! acknowledgement has been received.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use streetlight_types::SensorReading;
use streetlight_types::timestamp::to_unix_millis;

use crate::error::{Error, Result};
use crate::traits::{CloudSink, Reachability};

/// Default timeout for cloud pushes.
pub const DEFAULT_CLOUD_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for the reachability probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// A locally stored reading on its way to the cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudRecord {
    /// Local row id, used to mark the record synced afterwards.
    pub id: i64,
    /// The reading itself.
    pub reading: SensorReading,
}

impl CloudRecord {
    pub fn new(id: i64, reading: SensorReading) -> Self {
        Self { id, reading }
    }
}

/// JSON body sent to the cloud store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CloudPayload {
    id: i64,
    timestamp: i64,
    illuminance: f64,
    visibility: f64,
    motion: bool,
    synced_at: i64,
}

impl CloudPayload {
    fn from_record(record: &CloudRecord, synced_at: OffsetDateTime) -> Self {
        Self {
            id: record.id,
            timestamp: to_unix_millis(record.reading.timestamp),
            illuminance: record.reading.illuminance,
            visibility: record.reading.visibility,
            motion: record.reading.motion,
            synced_at: to_unix_millis(synced_at),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PushAck {
    name: String,
}

fn validate_url(url: &str) -> Result<String> {
    let url = url.trim_end_matches('/').to_string();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(Error::InvalidUrl(format!(
            "URL must start with http:// or https://, got: {}",
            url
        )));
    }
    Ok(url)
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::InvalidUrl(format!("failed to build HTTP client: {e}")))
}

/// HTTP implementation of [`CloudSink`].
#[derive(Debug, Clone)]
pub struct HttpCloudSink {
    client: Client,
    base_url: String,
    collection: String,
    auth: Option<String>,
    timeout: Duration,
}

impl HttpCloudSink {
    /// Create a sink appending to `collection` under `base_url`.
    pub fn new(base_url: &str, collection: &str, auth: Option<String>) -> Result<Self> {
        Self::with_timeout(base_url, collection, auth, DEFAULT_CLOUD_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        collection: &str,
        auth: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = validate_url(base_url)?;
        let collection = collection.trim_matches('/').to_string();
        if collection.is_empty() {
            return Err(Error::InvalidUrl("collection name cannot be empty".into()));
        }
        Ok(Self {
            client: build_client(timeout)?,
            base_url,
            collection,
            auth: auth.filter(|a| !a.is_empty()),
            timeout,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self) -> String {
        format!("{}/{}.json", self.base_url, self.collection)
    }
}

#[async_trait]
impl CloudSink for HttpCloudSink {
    async fn push(&self, record: &CloudRecord) -> Result<String> {
        let url = self.collection_url();
        let payload = CloudPayload::from_record(record, OffsetDateTime::now_utc());

        let mut request = self.client.post(&url).json(&payload);
        if let Some(auth) = &self.auth {
            request = request.query(&[("auth", auth)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::from_request(&url, self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or_else(|| status.to_string());
            return Err(Error::Api {
                url,
                status: status.as_u16(),
                message,
            });
        }

        let ack: PushAck = response
            .json()
            .await
            .map_err(|e| Error::from_request(&url, self.timeout, e))?;
        Ok(ack.name)
    }
}

/// Reachability check that GETs a probe URL.
///
/// Any HTTP response, whatever its status, means the network path works.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: validate_url(url)?,
        })
    }

    /// Get the probe URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Reachability for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Probe {} failed: {}", self.url, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{closed_port_url, serve_once, serve_silent};

    fn record(id: i64) -> CloudRecord {
        CloudRecord::new(
            id,
            SensorReading::clamped(OffsetDateTime::UNIX_EPOCH, 8000.0, 20.0, true),
        )
    }

    #[test]
    fn test_sink_rejects_invalid_url() {
        let result = HttpCloudSink::new("example.com", "sensors", None);
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
        let result = HttpCloudSink::new("http://example.com", "/", None);
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_collection_url() {
        let sink = HttpCloudSink::new("https://db.example.com/", "sensors", None).unwrap();
        assert_eq!(sink.base_url(), "https://db.example.com");
        assert_eq!(sink.collection_url(), "https://db.example.com/sensors.json");
    }

    #[test]
    fn test_payload_shape() {
        let payload = CloudPayload::from_record(&record(7), OffsetDateTime::UNIX_EPOCH);
        let json = serde_json::to_value(payload).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["timestamp"], 0);
        assert_eq!(json["illuminance"], 8000.0);
        assert_eq!(json["motion"], true);
        assert_eq!(json["syncedAt"], 0);
    }

    #[tokio::test]
    async fn test_push_returns_assigned_key() {
        let (url, request) = serve_once("200 OK", r#"{"name":"-Nabc123"}"#).await;
        let sink = HttpCloudSink::new(&url, "sensors", Some("secret".into())).unwrap();
        let key = sink.push(&record(1)).await.unwrap();
        assert_eq!(key, "-Nabc123");

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /sensors.json?auth=secret "));
        assert!(request.contains("\"illuminance\":8000.0"));
    }

    #[tokio::test]
    async fn test_push_rejection_is_api_error() {
        let (url, _request) = serve_once("401 Unauthorized", r#"{"error":"Permission denied"}"#).await;
        let sink = HttpCloudSink::new(&url, "sensors", None).unwrap();
        let err = sink.push(&record(1)).await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 401, ref message, .. } if message == "Permission denied"));
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_push_without_ack_is_invalid_data() {
        let (url, _request) = serve_once("200 OK", r#"{"ok":true}"#).await;
        let sink = HttpCloudSink::new(&url, "sensors", None).unwrap();
        let err = sink.push(&record(1)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidData { .. }));
    }

    #[tokio::test]
    async fn test_push_times_out() {
        let url = serve_silent().await;
        let sink =
            HttpCloudSink::with_timeout(&url, "sensors", None, Duration::from_millis(100)).unwrap();
        let err = sink.push(&record(1)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_probe_reachable_on_any_status() {
        let (url, _request) = serve_once("404 Not Found", "{}").await;
        let probe = HttpProbe::new(&url).unwrap();
        assert!(probe.is_reachable().await);
    }

    #[tokio::test]
    async fn test_probe_unreachable() {
        let url = closed_port_url().await;
        let probe = HttpProbe::with_timeout(&url, Duration::from_millis(200)).unwrap();
        assert!(!probe.is_reachable().await);
    }
}
