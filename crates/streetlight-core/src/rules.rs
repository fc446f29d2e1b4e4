//! Lighting rules.
//!
//! [`decide`] maps one reading plus the time since motion was last seen to a
//! target [`DeviceState`]:
//!
//! | Condition | LED |
//! |-----------|-----|
//! | `illuminance >= lux_target` | 0 (daylight) |
//! | motion now, or within `motion_timeout` | 100 |
//! | otherwise | 20 (standby) |
//!
//! Fog lights are on whenever `visibility < visibility_limit`, independent of
//! the LED level.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use streetlight_core::rules::decide;
//! use streetlight_types::{DeviceState, RuleThresholds, SensorReading};
//! use time::OffsetDateTime;
//!
//! let reading = SensorReading::clamped(OffsetDateTime::UNIX_EPOCH, 8000.0, 20.0, false);
//! let state = decide(&reading, Duration::from_secs(6), &RuleThresholds::default());
//! assert_eq!(state, DeviceState::new(20, true));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use streetlight_types::{DeviceState, RuleThresholds, SensorReading};

/// LED level when ambient light is sufficient.
pub const BRIGHTNESS_OFF: u8 = 0;
/// LED level while motion is recent.
pub const BRIGHTNESS_FULL: u8 = 100;
/// LED level when dark and idle.
pub const BRIGHTNESS_STANDBY: u8 = 20;

/// Which lighting rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LampMode {
    /// Enough daylight, LED off.
    Off,
    /// Dark with recent motion.
    Full,
    /// Dark and idle.
    Standby,
}

impl LampMode {
    /// LED brightness for this mode.
    pub fn brightness(&self) -> u8 {
        match self {
            LampMode::Off => BRIGHTNESS_OFF,
            LampMode::Full => BRIGHTNESS_FULL,
            LampMode::Standby => BRIGHTNESS_STANDBY,
        }
    }

    /// Get a human-readable description of the mode.
    pub fn description(&self) -> &'static str {
        match self {
            LampMode::Off => "Off - ambient light is sufficient",
            LampMode::Full => "Full - motion detected recently",
            LampMode::Standby => "Standby - dark, no recent motion",
        }
    }
}

/// Pick the lamp mode for a reading.
pub fn lamp_mode(
    reading: &SensorReading,
    since_motion: Duration,
    thresholds: &RuleThresholds,
) -> LampMode {
    if reading.illuminance >= thresholds.lux_target() {
        LampMode::Off
    } else if reading.motion || since_motion < thresholds.motion_timeout() {
        LampMode::Full
    } else {
        LampMode::Standby
    }
}

/// Decide the target actuator state for a reading. Pure.
pub fn decide(
    reading: &SensorReading,
    since_motion: Duration,
    thresholds: &RuleThresholds,
) -> DeviceState {
    DeviceState::new(
        lamp_mode(reading, since_motion, thresholds).brightness(),
        reading.visibility < thresholds.visibility_limit(),
    )
}

/// Tracks when motion was last observed.
///
/// Seeded with the instant the controller started, so a dark street stays
/// fully lit for one timeout after start-up.
#[derive(Debug, Clone, Copy)]
pub struct MotionTimer {
    started_at: Instant,
    last_motion: Instant,
}

impl Default for MotionTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionTimer {
    /// Start a timer seeded with the current instant.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(at: Instant) -> Self {
        Self {
            started_at: at,
            last_motion: at,
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn last_motion(&self) -> Instant {
        self.last_motion
    }

    /// Record a reading. Returns the time since the last motion, measured
    /// after this reading has been taken into account.
    pub fn observe(&mut self, reading: &SensorReading) -> Duration {
        let now = Instant::now();
        if reading.motion {
            self.last_motion = now;
        }
        now.saturating_duration_since(self.last_motion)
    }

    /// Time since motion was last seen.
    pub fn elapsed(&self) -> Duration {
        self.last_motion.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use time::OffsetDateTime;

    use super::*;

    fn reading(lux: f64, visibility: f64, motion: bool) -> SensorReading {
        SensorReading::clamped(OffsetDateTime::UNIX_EPOCH, lux, visibility, motion)
    }

    #[test]
    fn test_daylight_turns_led_off() {
        let t = RuleThresholds::default();
        let state = decide(&reading(10_000.0, 90.0, true), Duration::ZERO, &t);
        assert_eq!(state, DeviceState::new(0, false));
    }

    #[test]
    fn test_dark_with_motion_is_full() {
        let t = RuleThresholds::default();
        let state = decide(&reading(500.0, 90.0, true), Duration::from_secs(60), &t);
        assert_eq!(state.led_brightness, 100);
    }

    #[test]
    fn test_dark_recent_motion_is_full() {
        let t = RuleThresholds::default();
        let state = decide(&reading(500.0, 90.0, false), Duration::from_millis(4999), &t);
        assert_eq!(state.led_brightness, 100);
    }

    #[test]
    fn test_timeout_boundary_is_standby() {
        let t = RuleThresholds::default();
        let state = decide(&reading(500.0, 90.0, false), Duration::from_secs(5), &t);
        assert_eq!(state.led_brightness, 20);
    }

    #[test]
    fn test_scenario_dark_foggy_idle() {
        let t = RuleThresholds::new(10_000.0, 30.0, Duration::from_millis(5000)).unwrap();
        let state = decide(&reading(8000.0, 20.0, false), Duration::from_millis(6000), &t);
        assert_eq!(state, DeviceState::new(20, true));
    }

    #[test]
    fn test_fog_boundary() {
        let t = RuleThresholds::default();
        assert!(!decide(&reading(0.0, 30.0, false), Duration::ZERO, &t).fog_lights);
        assert!(decide(&reading(0.0, 29.9, false), Duration::ZERO, &t).fog_lights);
    }

    #[test]
    fn test_lamp_mode_descriptions() {
        assert!(LampMode::Off.description().contains("Off"));
        assert!(LampMode::Standby.description().contains("Standby"));
        assert_eq!(LampMode::Full.brightness(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_motion_timer_seeded_at_start() {
        let mut timer = MotionTimer::new();
        assert_eq!(timer.started_at(), timer.last_motion());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(timer.observe(&reading(0.0, 90.0, false)), Duration::from_secs(3));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(timer.observe(&reading(0.0, 90.0, true)), Duration::ZERO);
        assert!(timer.last_motion() > timer.started_at());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(timer.elapsed(), Duration::from_secs(6));
    }

    proptest! {
        #[test]
        fn bright_always_off(lux in 10_000.0f64..=100_000.0, vis in 0.0f64..=100.0, motion in any::<bool>(), ms in 0u64..100_000) {
            let state = decide(&reading(lux, vis, motion), Duration::from_millis(ms), &RuleThresholds::default());
            prop_assert_eq!(state.led_brightness, 0);
        }

        #[test]
        fn dark_motion_always_full(lux in 0.0f64..9_999.0, vis in 0.0f64..=100.0, ms in 0u64..100_000) {
            let state = decide(&reading(lux, vis, true), Duration::from_millis(ms), &RuleThresholds::default());
            prop_assert_eq!(state.led_brightness, 100);
        }

        #[test]
        fn dark_idle_past_timeout_is_standby(lux in 0.0f64..9_999.0, vis in 0.0f64..=100.0, ms in 5_000u64..100_000) {
            let state = decide(&reading(lux, vis, false), Duration::from_millis(ms), &RuleThresholds::default());
            prop_assert_eq!(state.led_brightness, 20);
        }

        #[test]
        fn fog_matches_visibility(vis in 0.0f64..=100.0) {
            let state = decide(&reading(0.0, vis, false), Duration::ZERO, &RuleThresholds::default());
            prop_assert_eq!(state.fog_lights, vis < 30.0);
        }
    }
}
