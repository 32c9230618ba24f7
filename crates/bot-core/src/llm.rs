//! Language-model seam.
//!
//! The orchestrator and the reminder dialogue only ever talk to this trait;
//! the `openai-brain` crate provides the production implementation and
//! tests provide scripted ones.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::history::Turn;

/// A generated reply plus the model that produced it, when reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmReply {
    /// Reply text, trimmed.
    pub text: String,
    /// Model identifier used for this reply, if the API reported one.
    pub model: Option<String>,
}

/// Structured output of the reminder-extraction call.
///
/// Every field is defaulted so a partially filled model answer still
/// deserializes; the dialogue treats missing fields as "not provided".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReminderParse {
    /// Detected intent; `"set_reminder"` enters the scheduling flow.
    #[serde(default)]
    pub intent: String,
    /// What to remind about, with time words stripped.
    #[serde(default)]
    pub text: String,
    /// Resolved local datetime as an ISO naive string, if the model found
    /// one.
    #[serde(default)]
    pub datetime_local: Option<String>,
    /// Recurrence wire word (`"none"`, `"daily"`, ...).
    #[serde(default = "default_repeat")]
    pub repeat: String,
    /// Extraction confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: f64,
    /// The time phrase as the user wrote it, for overdue notices.
    #[serde(default)]
    pub original_time_phrase: String,
}

fn default_repeat() -> String {
    "none".to_string()
}

/// Contract of the external language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a reply to `user_text` given the prior history (summary
    /// first, oldest turns first).
    async fn generate_reply(
        &self,
        history: &[Turn],
        user_text: &str,
    ) -> Result<LlmReply, LlmError>;

    /// Extract a reminder request from free text. `timezone` is the user's
    /// known zone, if any; `now_local_iso` anchors relative phrases like
    /// "tomorrow".
    async fn parse_reminder(
        &self,
        text: &str,
        timezone: Option<&str>,
        now_local_iso: &str,
    ) -> Result<ReminderParse, LlmError>;
}
