//! HTTP task dispatcher.
//!
//! Talks to a Cloud-Tasks-style scheduler service: we enqueue a task that
//! POSTs a JSON payload back to one of our own endpoints at a chosen UTC
//! instant. The shared `X-Tasks-Token` header is echoed back on delivery so
//! the gateway can authenticate the callback.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use tracing::debug;

use bot_core::{DispatchError, TaskDispatcher};

/// Routing identifiers for the scheduler queue.
#[derive(Debug, Clone)]
pub struct DispatchRouting {
    /// Project the queue lives in.
    pub project_id: String,
    /// Queue location (region).
    pub location: String,
    /// Queue name.
    pub queue: String,
    /// Public base URL of our own gateway; callback paths are appended.
    pub callback_base: String,
}

/// Dispatcher that enqueues HTTP callback tasks over the scheduler's REST
/// API.
pub struct HttpTaskDispatcher {
    client: Client,
    api_url: String,
    routing: DispatchRouting,
    token: Option<String>,
}

impl HttpTaskDispatcher {
    /// Default scheduler API endpoint.
    pub const DEFAULT_API_URL: &'static str = "https://cloudtasks.googleapis.com/v2";

    /// Create a dispatcher against the default scheduler endpoint.
    pub fn new(routing: DispatchRouting, token: Option<String>) -> Self {
        Self::with_api_url(Self::DEFAULT_API_URL, routing, token)
    }

    /// Create a dispatcher against a custom scheduler endpoint (tests,
    /// emulators).
    pub fn with_api_url(api_url: &str, routing: DispatchRouting, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            routing,
            token,
        }
    }

    fn queue_url(&self) -> String {
        format!(
            "{}/projects/{}/locations/{}/queues/{}/tasks",
            self.api_url, self.routing.project_id, self.routing.location, self.routing.queue
        )
    }

    fn build_task(
        &self,
        path: &str,
        payload: &serde_json::Value,
        at_utc: DateTime<Utc>,
    ) -> serde_json::Value {
        let url = format!(
            "{}{}",
            self.routing.callback_base.trim_end_matches('/'),
            path
        );
        let body = base64::engine::general_purpose::STANDARD.encode(payload.to_string());

        let mut headers = serde_json::json!({ "Content-Type": "application/json" });
        if let Some(token) = &self.token {
            headers["X-Tasks-Token"] = serde_json::Value::String(token.clone());
        }

        serde_json::json!({
            "task": {
                "httpRequest": {
                    "httpMethod": "POST",
                    "url": url,
                    "headers": headers,
                    "body": body,
                },
                "scheduleTime": at_utc.to_rfc3339_opts(SecondsFormat::Secs, true),
            }
        })
    }
}

#[async_trait]
impl TaskDispatcher for HttpTaskDispatcher {
    async fn schedule_callback(
        &self,
        path: &str,
        payload: serde_json::Value,
        at_utc: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let task = self.build_task(path, &payload, at_utc);
        let url = self.queue_url();

        debug!("Enqueueing callback task for {} at {}", path, at_utc);

        let response = self
            .client
            .post(&url)
            .json(&task)
            .send()
            .await
            .map_err(|e| DispatchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Request(format!(
                "scheduler answered {}: {}",
                status.as_u16(),
                body
            )));
        }
        Ok(())
    }
}
