//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use streetlight_types::SensorReading;
use streetlight_types::timestamp::to_unix_millis;

/// A reading stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReading {
    /// Database row ID.
    pub id: i64,
    /// When this reading was captured.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Ambient light in lux.
    pub illuminance: f64,
    /// Visibility in percent.
    pub visibility: f64,
    /// Whether motion was detected.
    pub motion: bool,
    /// Whether the cloud store has acknowledged this reading.
    pub synced: bool,
    /// When the reading was acknowledged.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub synced_at: Option<OffsetDateTime>,
}

impl StoredReading {
    /// Create an unsynced StoredReading from a SensorReading.
    pub fn from_reading(reading: &SensorReading) -> Self {
        Self {
            id: 0, // Will be set by database
            timestamp: reading.timestamp,
            illuminance: reading.illuminance,
            visibility: reading.visibility,
            motion: reading.motion,
            synced: false,
            synced_at: None,
        }
    }

    /// Convert to a SensorReading.
    pub fn to_reading(&self) -> SensorReading {
        SensorReading {
            timestamp: self.timestamp,
            illuminance: self.illuminance,
            visibility: self.visibility,
            motion: self.motion,
        }
    }
}

/// Flat row written by CSV export.
#[derive(Debug, Serialize)]
pub(crate) struct CsvRow {
    pub id: i64,
    pub timestamp: String,
    pub timestamp_ms: i64,
    pub illuminance: f64,
    pub visibility: f64,
    pub motion: bool,
    pub synced: bool,
    pub synced_at_ms: Option<i64>,
}

impl CsvRow {
    pub(crate) fn from_stored(reading: &StoredReading) -> Self {
        let timestamp = reading
            .timestamp
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        Self {
            id: reading.id,
            timestamp,
            timestamp_ms: to_unix_millis(reading.timestamp),
            illuminance: reading.illuminance,
            visibility: reading.visibility,
            motion: reading.motion,
            synced: reading.synced,
            synced_at_ms: reading.synced_at.map(to_unix_millis),
        }
    }
}
