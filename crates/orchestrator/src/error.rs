//! Error types for orchestrator operations.

use bot_core::{DispatchError, LlmError, StoreError, TimeError};
use thiserror::Error;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Conversation store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Language-model call failure.
    #[error("language model error: {0}")]
    Llm(#[from] LlmError),

    /// Database failure.
    #[error("database error: {0}")]
    Database(#[from] database::DatabaseError),

    /// Date/time conversion failure.
    #[error("time error: {0}")]
    Time(#[from] TimeError),

    /// Message sending failed.
    #[error("send failed: {0}")]
    Send(String),

    /// External scheduler failure.
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}
