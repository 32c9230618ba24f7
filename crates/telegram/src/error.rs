//! Telegram client error types.

use thiserror::Error;

/// Errors from Telegram Bot API calls.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// Transport-level failure.
    #[error("telegram network error: {0}")]
    Network(String),

    /// The API answered with `ok: false` or a non-success status.
    #[error("telegram API error ({status}): {description}")]
    Api { status: u16, description: String },
}
