//! Error types for streetlight-core.
//!
//! Almost every failure here means "the collaborator is unavailable". The
//! control loop treats those as routine: it falls back to the simulator,
//! applies decisions locally, or leaves records for the next sync cycle.
//!
//! | Error | Treated as |
//! |-------|------------|
//! | [`Error::Timeout`] | unavailable |
//! | [`Error::Unavailable`] | unavailable |
//! | [`Error::Api`] | unavailable |
//! | [`Error::InvalidData`] | unavailable |
//! | [`Error::InvalidUrl`] | configuration error |
//! | [`Error::InvalidValue`] | programmer/configuration error |

use std::time::Duration;

use thiserror::Error;

use streetlight_types::ValueError;

/// Errors that can occur when talking to remote collaborators.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The endpoint could not be reached.
    #[error("Endpoint unavailable at {url}: {reason}")]
    Unavailable {
        /// The URL that was requested.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// The request did not complete in time.
    #[error("Request to {url} timed out after {duration:?}")]
    Timeout {
        /// The URL that was requested.
        url: String,
        /// The timeout that elapsed.
        duration: Duration,
    },

    /// The endpoint answered with a non-success status.
    #[error("API error {status} from {url}: {message}")]
    Api {
        url: String,
        status: u16,
        message: String,
    },

    /// The endpoint answered with a body we could not use.
    #[error("Invalid data from {url}: {message}")]
    InvalidData { url: String, message: String },

    /// Invalid endpoint URL in configuration.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A domain value failed validation.
    #[error(transparent)]
    InvalidValue(#[from] ValueError),
}

impl Error {
    /// Whether this error means the collaborator is (temporarily) unavailable.
    ///
    /// Unavailability is recovered locally and never surfaced to users for
    /// routine ticks.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Error::Unavailable { .. }
                | Error::Timeout { .. }
                | Error::Api { .. }
                | Error::InvalidData { .. }
        )
    }

    /// Classify a transport error from reqwest.
    pub(crate) fn from_request(url: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout {
                url: url.to_string(),
                duration: timeout,
            }
        } else if err.is_decode() {
            Error::InvalidData {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            Error::Unavailable {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// Result type alias using streetlight-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
