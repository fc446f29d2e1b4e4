//! Validation errors for streetlight domain values.

use thiserror::Error;

/// A value fell outside the range the controller accepts.
///
/// Construction of thresholds, device states and readings goes through
/// validation, so malformed configuration is rejected up front instead of
/// producing nonsense decisions later.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ValueError {
    /// Illuminance is not a finite value in `0..=100000` lux.
    #[error("illuminance {0} is outside 0-100000 lux")]
    Illuminance(f64),

    /// Visibility is not a finite percentage.
    #[error("visibility {0} is outside 0-100%")]
    Visibility(f64),

    /// LED brightness above 100%.
    #[error("LED brightness {0} exceeds 100%")]
    Brightness(u8),

    /// Lux target is negative, too large or not finite.
    #[error("lux target {0} must be a finite value in 0-100000")]
    LuxTarget(f64),

    /// Visibility limit is not a finite percentage.
    #[error("visibility limit {0} must be a finite percentage in 0-100")]
    VisibilityLimit(f64),
}

/// Result type alias using [`ValueError`].
pub type ValueResult<T> = std::result::Result<T, ValueError>;
