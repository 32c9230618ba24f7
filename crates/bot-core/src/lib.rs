//! Core traits and types for the Sova Telegram assistant.
//!
//! This crate provides the shared contracts used by every other crate in the
//! workspace:
//!
//! - [`Turn`] / [`Role`] - conversation history types
//! - [`ConversationStore`] - the history contract, plus the in-memory
//!   [`MemoryStore`] backend
//! - [`LanguageModel`] / [`Summarizer`] - the language-model seams
//! - [`TaskDispatcher`] - the external scheduler seam
//! - time math: timezone aliasing, local/UTC conversion, recurrence
//!   advancement
//!
//! # Example
//!
//! ```rust
//! use bot_core::{ConversationStore, MemoryStore, Role};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let store = MemoryStore::new(24);
//!     store.append_message(7, Role::User, "hello").await.unwrap();
//!     let history = store.recent_history(7, 16).await.unwrap();
//!     assert_eq!(history.len(), 1);
//! }
//! ```

mod dispatch;
mod error;
mod history;
mod llm;
pub mod timemath;

pub use dispatch::{NoopDispatcher, TaskDispatcher};
pub use error::{DispatchError, LlmError, StoreError, TimeError};
pub use history::{ConversationStore, MemoryStore, Role, Summarizer, Turn};
pub use llm::{LanguageModel, LlmReply, ReminderParse};
pub use timemath::Repeat;

// Re-export async_trait for convenience
pub use async_trait::async_trait;
