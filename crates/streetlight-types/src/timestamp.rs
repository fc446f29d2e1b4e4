//! Conversions between [`OffsetDateTime`] and Unix milliseconds.
//!
//! Remote endpoints and the local database exchange timestamps as integer
//! milliseconds since the Unix epoch.

use time::OffsetDateTime;

/// Milliseconds since the Unix epoch.
///
/// ```
/// use streetlight_types::timestamp::to_unix_millis;
/// use time::OffsetDateTime;
///
/// assert_eq!(to_unix_millis(OffsetDateTime::UNIX_EPOCH), 0);
/// ```
pub fn to_unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Parse milliseconds since the Unix epoch, `None` if out of range.
pub fn from_unix_millis(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}
