//! Summary statistics over the history window.
//!
//! # Example
//!
//! ```
//! use streetlight_core::StatisticsEngine;
//! use streetlight_types::{SensorReading, Trend};
//! use time::OffsetDateTime;
//!
//! let readings: Vec<_> = [10.0, 20.0, 30.0]
//!     .into_iter()
//!     .map(|lux| SensorReading::clamped(OffsetDateTime::UNIX_EPOCH, lux, 50.0, false))
//!     .collect();
//!
//! let stats = StatisticsEngine::default().compute(&readings);
//! assert_eq!(stats.median_lux, 20.0);
//! assert_eq!(stats.trend, Trend::Stable);
//! ```

use streetlight_types::{SensorReading, Statistics, Trend};

/// Default dead band (lux) between the two half-window means.
pub const DEFAULT_TREND_BAND: f64 = 100.0;

/// Computes [`Statistics`] from a window of readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticsEngine {
    trend_band: f64,
}

impl Default for StatisticsEngine {
    fn default() -> Self {
        Self {
            trend_band: DEFAULT_TREND_BAND,
        }
    }
}

impl StatisticsEngine {
    /// Create an engine with a custom trend band. Negative or non-finite
    /// bands fall back to the default.
    pub fn new(trend_band: f64) -> Self {
        let trend_band = if trend_band.is_finite() && trend_band >= 0.0 {
            trend_band
        } else {
            DEFAULT_TREND_BAND
        };
        Self { trend_band }
    }

    pub fn trend_band(&self) -> f64 {
        self.trend_band
    }

    /// Compute statistics over `readings`, oldest first.
    pub fn compute<'a, I>(&self, readings: I) -> Statistics
    where
        I: IntoIterator<Item = &'a SensorReading>,
    {
        let lux: Vec<f64> = readings.into_iter().map(|r| r.illuminance).collect();
        if lux.is_empty() {
            return Statistics::default();
        }

        Statistics {
            count: lux.len(),
            average_lux: mean(&lux),
            median_lux: median(&lux),
            trend: self.trend(&lux),
        }
    }

    /// Compare the mean of the newer half against the older half.
    fn trend(&self, lux: &[f64]) -> Trend {
        if lux.len() < 2 {
            return Trend::Stable;
        }
        let (first, second) = lux.split_at(lux.len() / 2);
        let delta = mean(second) - mean(first);
        if delta > self.trend_band {
            Trend::Up
        } else if delta < -self.trend_band {
            Trend::Down
        } else {
            Trend::Stable
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
