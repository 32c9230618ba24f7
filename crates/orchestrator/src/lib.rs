//! Message orchestrator for the Sova Telegram assistant.
//!
//! This crate provides the [`Orchestrator`] type which composes the full
//! inbound-message flow, and the [`ReminderService`] which owns the
//! reminder dialogue and delivery logic.
//!
//! # Architecture
//!
//! ```text
//! Telegram Update (from the gateway webhook)
//!          ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ORCHESTRATOR                           │
//! │                                                             │
//! │  1. Access check (admin only; mention/reply rules in        │
//! │     groups; leave chats added by strangers)                 │
//! │  2. Arithmetic fast path (no model call)                    │
//! │  3. Reminder dialogue (may short-circuit with a question    │
//! │     or a confirmation)                                      │
//! │  4. History read → LLM reply → history append               │
//! │  5. Detached compaction task                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reminder delivery runs independently of the message flow: the external
//! scheduler (or the periodic sweep) calls back into
//! [`ReminderService::deliver_reminder`] / [`ReminderService::sweep_due`].

pub mod access;
pub mod calc;
mod delivery;
mod dialogue;
mod dispatch;
mod error;
mod orchestrator;
mod sender;

#[cfg(test)]
pub(crate) mod testutil;

// Public exports
pub use delivery::DeliveryOutcome;
pub use dialogue::{PendingState, ReminderService};
pub use dispatch::{DispatchRouting, HttpTaskDispatcher};
pub use error::OrchestratorError;
pub use orchestrator::{Orchestrator, OrchestratorConfig, TEMPORARY_ERROR_TEXT};
pub use sender::{ChatTransport, NoopTransport};

// Re-export commonly used types from dependencies
pub use bot_core::{NoopDispatcher, TaskDispatcher};
