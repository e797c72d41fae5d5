//! Error types shared across the sync client layers.

use reqwest::StatusCode;
use thiserror::Error;
use validator::ValidationErrors;

/// Convenient result alias returning [`PullError`] failures.
pub type PullResult<T> = Result<T, PullError>;

/// Reasons a leaderboard or countdown payload is rejected before reaching the state.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The payload does not match the expected JSON shape.
    #[error("payload does not match the expected shape")]
    Decode(#[from] serde_json::Error),
    /// The payload decoded but breaks a field or snapshot invariant.
    #[error("payload failed validation: {0}")]
    Invalid(#[from] ValidationErrors),
    /// A textual end-instant could not be parsed as RFC 3339.
    #[error("unparseable end instant `{value}`")]
    InvalidInstant {
        /// Text as received.
        value: String,
        /// Parser failure.
        #[source]
        source: time::error::Parse,
    },
    /// A numeric end-instant is outside the representable range.
    #[error("end instant {millis}ms is out of range")]
    InstantOutOfRange {
        /// Offending value in milliseconds since the Unix epoch.
        millis: f64,
    },
}

/// Failures that can occur while pulling leaderboard data over HTTP.
#[derive(Debug, Error)]
pub enum PullError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build HTTP client")]
    ClientBuilder {
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },
    /// The request could not be sent or timed out.
    #[error("failed to send request to `{path}`")]
    RequestSend {
        /// Endpoint path relative to the backend origin.
        path: String,
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },
    /// The backend answered with a non-success status code.
    #[error("unexpected response status {status} for `{path}`")]
    RequestStatus {
        /// Endpoint path relative to the backend origin.
        path: String,
        /// Status returned by the backend.
        status: StatusCode,
    },
    /// The response body could not be read as JSON.
    #[error("failed to decode response for `{path}`")]
    DecodeResponse {
        /// Endpoint path relative to the backend origin.
        path: String,
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },
    /// The response body was JSON but not a valid leaderboard snapshot.
    #[error("invalid leaderboard payload from `{path}`")]
    InvalidPayload {
        /// Endpoint path relative to the backend origin.
        path: String,
        /// Why the payload was rejected.
        #[source]
        source: PayloadError,
    },
}

/// Errors raised while constructing a [`crate::services::sync_client::SyncClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured backend URL is not an absolute HTTP(S) URL.
    #[error("invalid backend URL `{url}`: {reason}")]
    InvalidBackendUrl {
        /// URL as configured.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The HTTP pull transport could not be created.
    #[error("failed to set up pull transport")]
    Pull(#[from] PullError),
}
