//! Domain types for the streetlight controller.
//!
//! This crate provides the shared, platform-agnostic types used by the
//! controller core, the local store and the service.
//!
//! # Features
//!
//! - Sensor readings (illuminance, visibility, motion)
//! - Actuator state and typed partial updates
//! - Validated rule thresholds
//! - Window statistics and trend classification
//!
//! # Example
//!
//! ```
//! use streetlight_types::{DeviceState, DeviceStatePatch, RuleThresholds};
//!
//! let thresholds = RuleThresholds::default();
//! assert_eq!(thresholds.lux_target(), 10_000.0);
//!
//! let state = DeviceState::default().merge(&DeviceStatePatch::led_brightness(100)).unwrap();
//! assert_eq!(state.led_brightness, 100);
//! ```

pub mod error;
pub mod timestamp;
pub mod types;

pub use error::{ValueError, ValueResult};
pub use types::{
    DeviceState, DeviceStatePatch, MAX_BRIGHTNESS, MAX_ILLUMINANCE, MAX_VISIBILITY,
    RuleThresholds, SensorReading, Statistics, ThresholdsPatch, Trend,
};

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;
    use time::OffsetDateTime;

    use super::*;

    // --- SensorReading ---

    #[test]
    fn test_clamped_reading_keeps_valid_values() {
        let reading = SensorReading::clamped(OffsetDateTime::UNIX_EPOCH, 8000.0, 20.0, true);
        assert_eq!(reading.illuminance, 8000.0);
        assert_eq!(reading.visibility, 20.0);
        assert!(reading.motion);
        assert!(reading.validate().is_ok());
    }

    #[test]
    fn test_clamped_reading_handles_nan() {
        let reading = SensorReading::clamped(OffsetDateTime::UNIX_EPOCH, f64::NAN, f64::INFINITY, false);
        assert_eq!(reading.illuminance, 0.0);
        assert_eq!(reading.visibility, 0.0);
    }

    #[test]
    fn test_reading_validate_rejects_out_of_range() {
        let mut reading = SensorReading::clamped(OffsetDateTime::UNIX_EPOCH, 1.0, 1.0, false);
        reading.illuminance = 100_001.0;
        assert_eq!(reading.validate(), Err(ValueError::Illuminance(100_001.0)));

        reading.illuminance = 10.0;
        reading.visibility = -0.5;
        assert_eq!(reading.validate(), Err(ValueError::Visibility(-0.5)));
    }

    #[test]
    fn test_reading_json_uses_camel_case() {
        let reading = SensorReading::clamped(OffsetDateTime::UNIX_EPOCH, 500.0, 80.0, true);
        let json = serde_json::to_value(reading).unwrap();
        assert_eq!(json["illuminance"], 500.0);
        assert_eq!(json["visibility"], 80.0);
        assert_eq!(json["motion"], true);
        assert_eq!(json["timestamp"], "1970-01-01T00:00:00Z");
    }

    // --- DeviceState ---

    #[test]
    fn test_device_state_default_is_off() {
        let state = DeviceState::default();
        assert_eq!(state.led_brightness, 0);
        assert!(!state.fog_lights);
    }

    #[test]
    fn test_merge_partial_patch() {
        let state = DeviceState::new(100, false);
        let merged = state.merge(&DeviceStatePatch::fog_lights(true)).unwrap();
        assert_eq!(merged, DeviceState::new(100, true));

        let merged = merged.merge(&DeviceStatePatch::led_brightness(40)).unwrap();
        assert_eq!(merged, DeviceState::new(40, true));
    }

    #[test]
    fn test_merge_empty_patch_is_identity() {
        let state = DeviceState::new(20, true);
        let patch = DeviceStatePatch::default();
        assert!(patch.is_empty());
        assert_eq!(state.merge(&patch).unwrap(), state);
    }

    #[test]
    fn test_merge_rejects_brightness_over_100() {
        let state = DeviceState::default();
        let err = state.merge(&DeviceStatePatch::led_brightness(150)).unwrap_err();
        assert_eq!(err, ValueError::Brightness(150));
        assert!(err.to_string().contains("150"));
    }

    #[test]
    fn test_device_state_json_shape() {
        let json = serde_json::to_string(&DeviceState::new(20, true)).unwrap();
        assert_eq!(json, r#"{"ledBrightness":20,"fogLights":true}"#);
    }

    #[test]
    fn test_patch_rejects_unknown_fields() {
        let result: Result<DeviceStatePatch, _> =
            serde_json::from_str(r#"{"ledBrightness": 50, "color": "red"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_patch_skips_missing_fields() {
        let patch: DeviceStatePatch = serde_json::from_str(r#"{"fogLights": true}"#).unwrap();
        assert_eq!(patch, DeviceStatePatch::fog_lights(true));
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#"{"fogLights":true}"#);
    }

    #[test]
    fn test_patch_from_full_state() {
        let patch = DeviceStatePatch::from(DeviceState::new(20, true));
        assert_eq!(patch.led_brightness, Some(20));
        assert_eq!(patch.fog_lights, Some(true));
    }

    #[test]
    fn test_device_state_display() {
        assert_eq!(DeviceState::new(20, true).to_string(), "LED=20% fog=on");
    }

    // --- RuleThresholds ---

    #[test]
    fn test_thresholds_default() {
        let t = RuleThresholds::default();
        assert_eq!(t.lux_target(), 10_000.0);
        assert_eq!(t.visibility_limit(), 30.0);
        assert_eq!(t.motion_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_thresholds_reject_invalid() {
        let timeout = Duration::from_secs(5);
        assert_eq!(
            RuleThresholds::new(-5.0, 30.0, timeout),
            Err(ValueError::LuxTarget(-5.0))
        );
        assert!(RuleThresholds::new(f64::NAN, 30.0, timeout).is_err());
        assert_eq!(
            RuleThresholds::new(1000.0, 101.0, timeout),
            Err(ValueError::VisibilityLimit(101.0))
        );
        assert!(RuleThresholds::new(0.0, 0.0, Duration::ZERO).is_ok());
    }

    #[test]
    fn test_thresholds_apply_patch() {
        let t = RuleThresholds::default();
        let patch = ThresholdsPatch {
            lux_target: Some(2000.0),
            motion_timeout_ms: Some(10_000),
            ..Default::default()
        };
        let updated = t.apply(&patch).unwrap();
        assert_eq!(updated.lux_target(), 2000.0);
        assert_eq!(updated.visibility_limit(), 30.0);
        assert_eq!(updated.motion_timeout(), Duration::from_secs(10));

        let bad = ThresholdsPatch {
            visibility_limit: Some(-1.0),
            ..Default::default()
        };
        assert!(t.apply(&bad).is_err());
    }

    #[test]
    fn test_thresholds_json_roundtrip_shape() {
        let json = serde_json::to_value(RuleThresholds::default()).unwrap();
        assert_eq!(json["luxTarget"], 10_000.0);
        assert_eq!(json["visibilityLimit"], 30.0);
        assert_eq!(json["motionTimeoutMs"], 5000);

        let parsed: RuleThresholds = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, RuleThresholds::default());
    }

    #[test]
    fn test_thresholds_deserialize_validates() {
        let result: Result<RuleThresholds, _> = serde_json::from_str(
            r#"{"luxTarget": -10, "visibilityLimit": 30, "motionTimeoutMs": 5000}"#,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("lux target"));
    }

    // --- Statistics / Trend ---

    #[test]
    fn test_statistics_default_is_zero_state() {
        let stats = Statistics::default();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.average_lux, 0.0);
        assert_eq!(stats.median_lux, 0.0);
        assert_eq!(stats.trend, Trend::Stable);
    }

    #[test]
    fn test_trend_serialization() {
        assert_eq!(serde_json::to_string(&Trend::Up).unwrap(), r#""UP""#);
        assert_eq!(serde_json::to_string(&Trend::Down).unwrap(), r#""DOWN""#);
        assert_eq!(serde_json::to_string(&Trend::Stable).unwrap(), r#""STABLE""#);
        assert_eq!(Trend::Down.to_string(), "DOWN");
    }

    #[test]
    fn test_statistics_json_shape() {
        let stats = Statistics {
            count: 3,
            average_lux: 20.0,
            median_lux: 20.0,
            trend: Trend::Up,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["averageLux"], 20.0);
        assert_eq!(json["medianLux"], 20.0);
        assert_eq!(json["trend"], "UP");
    }

    proptest! {
        #[test]
        fn clamped_readings_always_validate(lux in any::<f64>(), vis in any::<f64>()) {
            let reading = SensorReading::clamped(OffsetDateTime::UNIX_EPOCH, lux, vis, false);
            prop_assert!(reading.validate().is_ok());
        }

        #[test]
        fn merge_never_produces_invalid_state(b in 0u8..=100, fog in any::<bool>(), patch_b in proptest::option::of(any::<u8>())) {
            let state = DeviceState::new(b, fog);
            let patch = DeviceStatePatch { led_brightness: patch_b, fog_lights: None };
            if let Ok(merged) = state.merge(&patch) {
                prop_assert!(merged.led_brightness <= MAX_BRIGHTNESS);
            }
        }
    }
}
