//! Shared error types.

use thiserror::Error;

/// Errors from date/time parsing and conversion.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// The timezone name is not a valid IANA identifier.
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    /// The local wall-clock time does not exist in the zone (DST gap) or
    /// could not be parsed.
    #[error("invalid local datetime: {0}")]
    InvalidLocalDatetime(String),
}

/// Errors from conversation store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store failed (connection, query, etc.).
    #[error("store backend error: {0}")]
    Backend(String),

    /// The external summarization call failed; no state was committed.
    #[error("summarization failed: {0}")]
    Summarization(String),
}

/// Errors from language-model calls.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Missing or invalid client configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport-level failure reaching the API.
    #[error("network error: {0}")]
    Network(String),

    /// The API answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The model's output could not be parsed into the expected shape.
    #[error("failed to parse model output: {0}")]
    Parse(String),
}

/// Errors from the external task scheduler.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The dispatcher is missing required routing configuration.
    #[error("dispatcher configuration error: {0}")]
    Configuration(String),

    /// The scheduling request failed.
    #[error("dispatch request failed: {0}")]
    Request(String),
}
