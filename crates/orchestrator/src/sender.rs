//! Chat transport trait and implementations.

use async_trait::async_trait;
use telegram::TelegramBot;

use crate::error::OrchestratorError;

/// Trait for sending messages and leaving chats.
///
/// Abstracted to support different transports (Telegram, tests).
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a text message to a chat.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), OrchestratorError>;

    /// Leave a chat.
    async fn leave_chat(&self, chat_id: i64) -> Result<(), OrchestratorError>;
}

#[async_trait]
impl ChatTransport for TelegramBot {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), OrchestratorError> {
        TelegramBot::send_message(self, chat_id, text)
            .await
            .map_err(|e| OrchestratorError::Send(e.to_string()))
    }

    async fn leave_chat(&self, chat_id: i64) -> Result<(), OrchestratorError> {
        TelegramBot::leave_chat(self, chat_id)
            .await
            .map_err(|e| OrchestratorError::Send(e.to_string()))
    }
}

/// A transport that discards all messages, for tests.
#[derive(Debug, Clone, Default)]
pub struct NoopTransport;

#[async_trait]
impl ChatTransport for NoopTransport {
    async fn send_message(&self, _chat_id: i64, _text: &str) -> Result<(), OrchestratorError> {
        Ok(())
    }

    async fn leave_chat(&self, _chat_id: i64) -> Result<(), OrchestratorError> {
        Ok(())
    }
}
