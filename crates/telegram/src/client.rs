//! Telegram Bot API client.

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::TelegramError;
use crate::types::{ApiResponse, TgUser};

/// Telegram caps message text at 4096 characters; longer replies are split.
const MAX_MESSAGE_LENGTH: usize = 4096;

/// Client for the Telegram Bot API.
pub struct TelegramBot {
    client: Client,
    base_url: String,
}

impl TelegramBot {
    /// Create a client for the given bot token.
    pub fn new(token: &str) -> Self {
        Self::with_api_url("https://api.telegram.org", token)
    }

    /// Create a client against a custom API host (tests, local proxies).
    pub fn with_api_url(api_url: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        }
    }

    /// Identify the bot account (used to learn the bot's username).
    pub async fn get_me(&self) -> Result<TgUser, TelegramError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Send a text message, splitting it when it exceeds the API limit.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        for chunk in split_message(text) {
            let _: serde_json::Value = self
                .call(
                    "sendMessage",
                    &serde_json::json!({ "chat_id": chat_id, "text": chunk }),
                )
                .await?;
        }
        Ok(())
    }

    /// Leave a chat.
    pub async fn leave_chat(&self, chat_id: i64) -> Result<(), TelegramError> {
        let _: serde_json::Value = self
            .call("leaveChat", &serde_json::json!({ "chat_id": chat_id }))
            .await?;
        Ok(())
    }

    /// Register the webhook URL, optionally with a shared secret that
    /// Telegram echoes back in `X-Telegram-Bot-Api-Secret-Token`.
    pub async fn set_webhook(
        &self,
        url: &str,
        secret_token: Option<&str>,
    ) -> Result<(), TelegramError> {
        let mut body = serde_json::json!({
            "url": url,
            "drop_pending_updates": true,
            "allowed_updates": ["message", "my_chat_member"],
        });
        if let Some(secret) = secret_token {
            body["secret_token"] = serde_json::Value::String(secret.to_string());
        }
        let _: serde_json::Value = self.call("setWebhook", &body).await?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, TelegramError> {
        let url = format!("{}/{}", self.base_url, method);
        debug!("Calling Telegram method {}", method);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| TelegramError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let description = response.text().await.unwrap_or_default();
            return Err(TelegramError::Api {
                status: status.as_u16(),
                description,
            });
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TelegramError::Network(e.to_string()))?;

        if !envelope.ok {
            return Err(TelegramError::Api {
                status: status.as_u16(),
                description: envelope
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        envelope.result.ok_or_else(|| TelegramError::Api {
            status: status.as_u16(),
            description: "missing result in response".to_string(),
        })
    }
}

/// Split text into chunks the API accepts, preferring line boundaries.
fn split_message(text: &str) -> Vec<String> {
    if text.chars().count() <= MAX_MESSAGE_LENGTH {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.split_inclusive('\n') {
        if current.chars().count() + line.chars().count() > MAX_MESSAGE_LENGTH
            && !current.is_empty()
        {
            chunks.push(std::mem::take(&mut current));
        }
        // A single line longer than the limit gets hard-split.
        if line.chars().count() > MAX_MESSAGE_LENGTH {
            let mut rest: Vec<char> = line.chars().collect();
            while rest.len() > MAX_MESSAGE_LENGTH {
                let tail = rest.split_off(MAX_MESSAGE_LENGTH);
                chunks.push(rest.iter().collect());
                rest = tail;
            }
            current = rest.iter().collect();
        } else {
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
