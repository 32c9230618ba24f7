//! External task-dispatch seam.
//!
//! The scheduler is a collaborator that calls us back over HTTP at a chosen
//! instant. Arming it is an optimization: the reminder row in the database
//! is the source of truth, and the periodic sweep delivers anything the
//! scheduler missed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DispatchError;

/// Schedules a future HTTP callback at a specific UTC instant.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Arrange for `payload` to be POSTed to `path` on our own base URL at
    /// (approximately) `at_utc`.
    async fn schedule_callback(
        &self,
        path: &str,
        payload: serde_json::Value,
        at_utc: DateTime<Utc>,
    ) -> Result<(), DispatchError>;
}

/// Dispatcher that schedules nothing.
///
/// Used in tests and in deployments that rely on the sweep alone.
#[derive(Debug, Clone, Default)]
pub struct NoopDispatcher;

#[async_trait]
impl TaskDispatcher for NoopDispatcher {
    async fn schedule_callback(
        &self,
        _path: &str,
        _payload: serde_json::Value,
        _at_utc: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        Ok(())
    }
}
