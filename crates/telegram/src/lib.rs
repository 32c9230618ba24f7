//! Minimal Telegram Bot API client.
//!
//! Covers exactly what the gateway needs: sending messages, leaving chats,
//! webhook management, and the update payload types delivered to the
//! webhook endpoint.

mod client;
mod error;
pub mod types;

pub use client::TelegramBot;
pub use error::TelegramError;
pub use types::{Chat, ChatMember, ChatMemberUpdated, Message, TgUser, Update};
