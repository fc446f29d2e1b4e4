//! Core types for streetlight sensor data and actuator state.

use core::fmt;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ValueError, ValueResult};

/// Upper bound of the illuminance sensor in lux.
pub const MAX_ILLUMINANCE: f64 = 100_000.0;

/// Upper bound of the visibility sensor in percent.
pub const MAX_VISIBILITY: f64 = 100.0;

/// Full LED brightness in percent.
pub const MAX_BRIGHTNESS: u8 = 100;

/// A single sample from the street sensors.
///
/// Readings are immutable once produced. The persisted form (with a row id
/// and a `synced` flag) lives in `streetlight-store`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SensorReading {
    /// When the reading was taken.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Ambient light in lux (0-100000).
    pub illuminance: f64,
    /// Visibility in percent (0-100). Low values mean fog.
    pub visibility: f64,
    /// Whether motion was detected.
    pub motion: bool,
}

impl SensorReading {
    /// Create a reading, clamping both measurements into their valid ranges.
    ///
    /// Non-finite values are clamped to zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use streetlight_types::SensorReading;
    /// use time::OffsetDateTime;
    ///
    /// let r = SensorReading::clamped(OffsetDateTime::UNIX_EPOCH, 120_000.0, -3.0, false);
    /// assert_eq!(r.illuminance, 100_000.0);
    /// assert_eq!(r.visibility, 0.0);
    /// ```
    #[must_use]
    pub fn clamped(
        timestamp: OffsetDateTime,
        illuminance: f64,
        visibility: f64,
        motion: bool,
    ) -> Self {
        Self {
            timestamp,
            illuminance: clamp_finite(illuminance, MAX_ILLUMINANCE),
            visibility: clamp_finite(visibility, MAX_VISIBILITY),
            motion,
        }
    }

    /// Check that both measurements are finite and within range.
    pub fn validate(&self) -> ValueResult<()> {
        if !self.illuminance.is_finite() || !(0.0..=MAX_ILLUMINANCE).contains(&self.illuminance) {
            return Err(ValueError::Illuminance(self.illuminance));
        }
        if !self.visibility.is_finite() || !(0.0..=MAX_VISIBILITY).contains(&self.visibility) {
            return Err(ValueError::Visibility(self.visibility));
        }
        Ok(())
    }
}

fn clamp_finite(value: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        0.0
    }
}

/// Actuator state of a streetlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct DeviceState {
    /// LED brightness in percent (0-100).
    pub led_brightness: u8,
    /// Whether the fog lights are on.
    pub fog_lights: bool,
}

impl DeviceState {
    /// Create a device state.
    #[must_use]
    pub const fn new(led_brightness: u8, fog_lights: bool) -> Self {
        Self {
            led_brightness,
            fog_lights,
        }
    }

    /// Check that the brightness is a valid percentage.
    pub fn validate(&self) -> ValueResult<()> {
        if self.led_brightness > MAX_BRIGHTNESS {
            return Err(ValueError::Brightness(self.led_brightness));
        }
        Ok(())
    }

    /// Merge a partial update into this state.
    ///
    /// Fields missing from the patch keep their current value.
    ///
    /// # Examples
    ///
    /// ```
    /// use streetlight_types::{DeviceState, DeviceStatePatch};
    ///
    /// let state = DeviceState::new(20, false);
    /// let merged = state.merge(&DeviceStatePatch::fog_lights(true)).unwrap();
    /// assert_eq!(merged, DeviceState::new(20, true));
    /// ```
    pub fn merge(&self, patch: &DeviceStatePatch) -> ValueResult<DeviceState> {
        let merged = DeviceState {
            led_brightness: patch.led_brightness.unwrap_or(self.led_brightness),
            fog_lights: patch.fog_lights.unwrap_or(self.fog_lights),
        };
        merged.validate()?;
        Ok(merged)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LED={}% fog={}",
            self.led_brightness,
            if self.fog_lights { "on" } else { "off" }
        )
    }
}

/// Partial update of a [`DeviceState`].
///
/// Unknown fields are rejected when deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(rename_all = "camelCase", deny_unknown_fields)
)]
pub struct DeviceStatePatch {
    /// New LED brightness, if changing.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub led_brightness: Option<u8>,
    /// New fog light state, if changing.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub fog_lights: Option<bool>,
}

impl DeviceStatePatch {
    /// Patch that only sets the LED brightness.
    #[must_use]
    pub fn led_brightness(value: u8) -> Self {
        Self {
            led_brightness: Some(value),
            fog_lights: None,
        }
    }

    /// Patch that only sets the fog lights.
    #[must_use]
    pub fn fog_lights(on: bool) -> Self {
        Self {
            led_brightness: None,
            fog_lights: Some(on),
        }
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.led_brightness.is_none() && self.fog_lights.is_none()
    }
}

impl From<DeviceState> for DeviceStatePatch {
    fn from(state: DeviceState) -> Self {
        Self {
            led_brightness: Some(state.led_brightness),
            fog_lights: Some(state.fog_lights),
        }
    }
}

/// Thresholds driving the automatic lighting rules.
///
/// Can only be built through [`RuleThresholds::new`] (or deserialization,
/// which runs the same checks), so a value of this type is always valid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleThresholds {
    lux_target: f64,
    visibility_limit: f64,
    motion_timeout: Duration,
}

impl RuleThresholds {
    /// Default lux target: lamps switch off at or above this illuminance.
    pub const DEFAULT_LUX_TARGET: f64 = 10_000.0;
    /// Default visibility limit: fog lights switch on below this percentage.
    pub const DEFAULT_VISIBILITY_LIMIT: f64 = 30.0;
    /// Default time lamps stay at full brightness after motion.
    pub const DEFAULT_MOTION_TIMEOUT: Duration = Duration::from_millis(5_000);

    /// Create validated thresholds.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use streetlight_types::RuleThresholds;
    ///
    /// assert!(RuleThresholds::new(10_000.0, 30.0, Duration::from_secs(5)).is_ok());
    /// assert!(RuleThresholds::new(-1.0, 30.0, Duration::from_secs(5)).is_err());
    /// assert!(RuleThresholds::new(10_000.0, 130.0, Duration::from_secs(5)).is_err());
    /// ```
    pub fn new(
        lux_target: f64,
        visibility_limit: f64,
        motion_timeout: Duration,
    ) -> ValueResult<Self> {
        if !lux_target.is_finite() || !(0.0..=MAX_ILLUMINANCE).contains(&lux_target) {
            return Err(ValueError::LuxTarget(lux_target));
        }
        if !visibility_limit.is_finite() || !(0.0..=MAX_VISIBILITY).contains(&visibility_limit) {
            return Err(ValueError::VisibilityLimit(visibility_limit));
        }
        Ok(Self {
            lux_target,
            visibility_limit,
            motion_timeout,
        })
    }

    /// Illuminance at or above which the lamp is switched off.
    pub fn lux_target(&self) -> f64 {
        self.lux_target
    }

    /// Visibility below which fog lights are switched on.
    pub fn visibility_limit(&self) -> f64 {
        self.visibility_limit
    }

    /// How long the lamp stays at full brightness after motion.
    pub fn motion_timeout(&self) -> Duration {
        self.motion_timeout
    }

    /// Apply a partial update, validating the result.
    pub fn apply(&self, patch: &ThresholdsPatch) -> ValueResult<Self> {
        Self::new(
            patch.lux_target.unwrap_or(self.lux_target),
            patch.visibility_limit.unwrap_or(self.visibility_limit),
            patch
                .motion_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.motion_timeout),
        )
    }
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            lux_target: Self::DEFAULT_LUX_TARGET,
            visibility_limit: Self::DEFAULT_VISIBILITY_LIMIT,
            motion_timeout: Self::DEFAULT_MOTION_TIMEOUT,
        }
    }
}

#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ThresholdsWire {
    lux_target: f64,
    visibility_limit: f64,
    motion_timeout_ms: u64,
}

#[cfg(feature = "serde")]
impl Serialize for RuleThresholds {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ThresholdsWire {
            lux_target: self.lux_target,
            visibility_limit: self.visibility_limit,
            motion_timeout_ms: u64::try_from(self.motion_timeout.as_millis()).unwrap_or(u64::MAX),
        }
        .serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for RuleThresholds {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = ThresholdsWire::deserialize(deserializer)?;
        RuleThresholds::new(
            wire.lux_target,
            wire.visibility_limit,
            Duration::from_millis(wire.motion_timeout_ms),
        )
        .map_err(serde::de::Error::custom)
    }
}

/// Partial update of [`RuleThresholds`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(rename_all = "camelCase", deny_unknown_fields)
)]
pub struct ThresholdsPatch {
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub lux_target: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub visibility_limit: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub motion_timeout_ms: Option<u64>,
}

/// Direction of the illuminance trend over the history window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Trend {
    /// Getting brighter.
    Up,
    /// Getting darker.
    Down,
    /// No change beyond the hysteresis band.
    #[default]
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Up => write!(f, "UP"),
            Trend::Down => write!(f, "DOWN"),
            Trend::Stable => write!(f, "STABLE"),
        }
    }
}

/// Statistics derived from the history window.
///
/// Recomputed from scratch on every tick and never persisted. The default
/// value is the empty-window zero state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Statistics {
    /// Number of readings in the window.
    pub count: usize,
    /// Mean illuminance in lux.
    pub average_lux: f64,
    /// Median illuminance in lux.
    pub median_lux: f64,
    /// Illuminance trend.
    pub trend: Trend,
}
