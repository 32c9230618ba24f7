//! OpenAiBrain implementation against an OpenAI-compatible chat API.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use bot_core::{LanguageModel, LlmError, LlmReply, ReminderParse, Role, Summarizer, Turn};

use crate::api_types::{
    ApiError, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ResponseFormat,
};
use crate::config::OpenAiConfig;

/// A prompt longer than this never takes the low-cost model.
const FAST_PROMPT_MAX_CHARS: usize = 160;

/// A history longer than this (messages, summary included) never takes the
/// low-cost model.
const FAST_HISTORY_MAX_MESSAGES: usize = 5;

/// Phrases that force the standard model regardless of prompt length.
const FULL_MODEL_PHRASES: &[&str] = &[
    "стандартную модель",
    "стандартная модель",
    "полную модель",
    "обычную модель",
    "standard model",
    "full model",
];

const SUMMARIZE_SYSTEM_PROMPT: &str = "Ты сжимаешь историю переписки в короткую сводку. \
Сохрани факты, договорённости, имена и незакрытые вопросы. \
Ответь только текстом сводки, без вступлений.";

const REMINDER_PARSE_SYSTEM_PROMPT: &str = r#"Ты извлекаешь напоминание из сообщения пользователя.
Ответь одним JSON-объектом без пояснений, с полями:
- "intent": "set_reminder" если пользователь просит напомнить, иначе "other"
- "text": о чём напомнить, без слов о времени
- "datetime_local": локальное время в формате YYYY-MM-DDTHH:MM, либо null если время не названо
- "repeat": одно из "none", "hourly", "daily", "weekly", "monthly", "yearly"
- "confidence": число от 0 до 1
- "original_time_phrase": фраза о времени дословно, как написал пользователь
Относительные времена ("завтра", "через час") считай от текущего момента пользователя."#;

/// Language-model client that talks to an OpenAI-compatible chat API.
///
/// Short exchanges are routed to the configured low-cost model unless the
/// user explicitly asks for the full one.
pub struct OpenAiBrain {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBrain {
    /// Create a new brain with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "OpenAiBrain initialized with model: {}, fast model: {}",
            config.model,
            config.fast_model.as_deref().unwrap_or("(none)")
        );

        Ok(Self { client, config })
    }

    /// Create a brain from environment variables.
    ///
    /// See [`OpenAiConfig::from_env`] for the variables involved.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::new(OpenAiConfig::from_env()?)
    }

    /// Get the configuration.
    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    /// Pick the model for a reply: the low-cost one for short prompts in
    /// short conversations, unless the user asked for the full model.
    fn choose_model(&self, history_len: usize, user_text: &str) -> &str {
        let Some(fast) = self.config.fast_model.as_deref() else {
            return &self.config.model;
        };
        if user_text.chars().count() > FAST_PROMPT_MAX_CHARS {
            return &self.config.model;
        }
        if history_len > FAST_HISTORY_MAX_MESSAGES {
            return &self.config.model;
        }
        if requests_full_model(user_text) {
            return &self.config.model;
        }
        fast
    }

    /// Make a chat completion request.
    async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        json_mode: bool,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let url = format!("{}/v1/chat/completions", self.config.api_url);

        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: json_mode.then(ResponseFormat::json_object),
        };

        debug!("Sending request to chat API (model: {})", model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network(format!("Failed to send request: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            // Prefer the structured API error message when present.
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&error_text) {
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: api_error.error.message,
                });
            }

            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::Parse(format!("Failed to parse response: {}", e)))
    }

    fn history_to_messages(history: &[Turn]) -> Vec<ChatMessage> {
        history
            .iter()
            .map(|turn| ChatMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            })
            .collect()
    }

    fn extract_content(response: &ChatCompletionResponse) -> Result<String, LlmError> {
        response
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LlmError::Parse("empty completion content".to_string()))
    }
}

/// Does the text explicitly ask for the full-quality model?
fn requests_full_model(user_text: &str) -> bool {
    let lowered = user_text.to_lowercase();
    FULL_MODEL_PHRASES.iter().any(|p| lowered.contains(p))
}

/// Parse a reminder-extraction completion into the structured result.
///
/// Tolerates a Markdown code fence around the JSON object.
fn parse_reminder_content(content: &str) -> Result<ReminderParse, LlmError> {
    let trimmed = strip_code_fence(content.trim());
    serde_json::from_str(trimmed).map_err(|e| LlmError::Parse(format!("bad reminder JSON: {}", e)))
}

fn strip_code_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    // Drop the info string ("json") on the fence line.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.rsplit_once("```").map(|(body, _)| body).unwrap_or(rest).trim()
}

#[async_trait]
impl LanguageModel for OpenAiBrain {
    async fn generate_reply(
        &self,
        history: &[Turn],
        user_text: &str,
    ) -> Result<LlmReply, LlmError> {
        let model = self.choose_model(history.len(), user_text).to_string();

        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(prompt) = &self.config.system_prompt {
            messages.push(ChatMessage::system(prompt.clone()));
        }
        messages.extend(Self::history_to_messages(history));
        messages.push(ChatMessage::user(user_text));

        let completion = self.chat_completion(messages, &model, false).await?;
        let text = Self::extract_content(&completion)?;
        let model_used = completion.model.unwrap_or(model);

        Ok(LlmReply {
            text,
            model: Some(model_used),
        })
    }

    async fn parse_reminder(
        &self,
        text: &str,
        timezone: Option<&str>,
        now_local_iso: &str,
    ) -> Result<ReminderParse, LlmError> {
        let context = format!(
            "Текущее локальное время: {}\nЧасовой пояс: {}\nСообщение: {}",
            now_local_iso,
            timezone.unwrap_or("неизвестен"),
            text
        );
        let messages = vec![
            ChatMessage::system(REMINDER_PARSE_SYSTEM_PROMPT),
            ChatMessage::user(context),
        ];

        // Extraction always takes the cheap model when one is configured.
        let model = self
            .config
            .fast_model
            .as_deref()
            .unwrap_or(&self.config.model)
            .to_string();

        let completion = self.chat_completion(messages, &model, true).await?;
        let content = Self::extract_content(&completion)?;
        parse_reminder_content(&content)
    }
}

#[async_trait]
impl Summarizer for OpenAiBrain {
    async fn summarize(
        &self,
        turns: &[Turn],
        existing_summary: Option<&str>,
    ) -> Result<String, LlmError> {
        let mut body = String::new();
        if let Some(existing) = existing_summary {
            body.push_str("Предыдущая сводка:\n");
            body.push_str(existing);
            body.push_str("\n\n");
        }
        body.push_str("Новые сообщения:\n");
        for turn in turns {
            let speaker = match turn.role {
                Role::User => "Пользователь",
                Role::Assistant => "Ассистент",
                Role::System => "Система",
            };
            body.push_str(speaker);
            body.push_str(": ");
            body.push_str(&turn.content);
            body.push('\n');
        }

        let messages = vec![
            ChatMessage::system(SUMMARIZE_SYSTEM_PROMPT),
            ChatMessage::user(body),
        ];

        let model = self
            .config
            .fast_model
            .as_deref()
            .unwrap_or(&self.config.model)
            .to_string();

        let completion = self.chat_completion(messages, &model, false).await?;
        Self::extract_content(&completion)
    }
}
