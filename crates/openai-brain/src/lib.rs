//! OpenAI-backed language model client.
//!
//! Implements the [`bot_core::LanguageModel`] and [`bot_core::Summarizer`]
//! contracts against an OpenAI-compatible chat completion API:
//!
//! - reply generation, with an optional low-cost model for short exchanges
//! - conversation summarization for history compaction
//! - reminder extraction into structured JSON

mod api_types;
mod brain;
mod config;

pub use api_types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
pub use brain::OpenAiBrain;
pub use config::{OpenAiConfig, OpenAiConfigBuilder};
