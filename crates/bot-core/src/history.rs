//! Conversation history contract and the in-memory backend.
//!
//! A conversation is a per-user, append-only sequence of [`Turn`]s plus at
//! most one rolling summary. Old turns expire by TTL; when the stored count
//! grows past a trigger, [`ConversationStore::compact`] folds everything but
//! the recent tail into the summary via an external [`Summarizer`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{LlmError, StoreError};

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Wire representation, shared with storage and the chat API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Parse the wire representation.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

/// A single message in a conversation history.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    /// Who produced the turn.
    pub role: Role,
    /// Message content.
    pub content: String,
    /// UTC creation time; insertion order is conversation order.
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Create a turn stamped with the current UTC time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// External summarization seam used by [`ConversationStore::compact`].
///
/// Implemented by the LLM client; tests plug in scripted stand-ins.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Fold `turns` (oldest first) and the previous summary, if any, into a
    /// new summary text.
    async fn summarize(
        &self,
        turns: &[Turn],
        existing_summary: Option<&str>,
    ) -> Result<String, LlmError>;
}

/// Keyed conversation log with a rolling summary, TTL expiry, and
/// size-triggered compaction.
///
/// Implemented identically by the SQLite backend and [`MemoryStore`]; the
/// orchestrator only ever sees this trait.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a turn stamped with the current UTC time.
    ///
    /// Safe under concurrent callers for the same user.
    async fn append_message(
        &self,
        user_id: i64,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError>;

    /// Return the current summary (if any) as a synthetic leading system
    /// turn, followed by the most recent `max_messages` raw turns, oldest
    /// first. Expired turns and summaries are pruned before reading.
    async fn recent_history(
        &self,
        user_id: i64,
        max_messages: usize,
    ) -> Result<Vec<Turn>, StoreError>;

    /// If the stored turn count exceeds `summary_trigger`, summarize all but
    /// the last `max_messages` turns and atomically replace the older turns
    /// with the new summary (expiring `ttl_hours` from now).
    ///
    /// The summarizer is awaited outside any lock or transaction. On
    /// failure nothing is committed; the only failure mode is a no-op.
    async fn compact(
        &self,
        user_id: i64,
        max_messages: usize,
        summary_trigger: usize,
        ttl_hours: i64,
        summarizer: &dyn Summarizer,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct StoredSummary {
    content: String,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct UserConversation {
    /// Turns tagged with a per-store sequence number so compaction can
    /// delete exactly the turns it summarized, even if appends raced it.
    turns: Vec<(u64, Turn)>,
    summary: Option<StoredSummary>,
}

/// In-memory conversation store.
///
/// Used when the database is disabled. The lock is held only for map
/// mutation, never across the summarizer call.
pub struct MemoryStore {
    ttl_hours: i64,
    next_seq: RwLock<u64>,
    conversations: RwLock<HashMap<i64, UserConversation>>,
}

impl MemoryStore {
    /// Create a store whose turns expire `ttl_hours` after creation.
    pub fn new(ttl_hours: i64) -> Self {
        Self {
            ttl_hours,
            next_seq: RwLock::new(0),
            conversations: RwLock::new(HashMap::new()),
        }
    }

    fn prune(&self, conversation: &mut UserConversation, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(self.ttl_hours);
        conversation.turns.retain(|(_, t)| t.created_at >= cutoff);
        if let Some(summary) = &conversation.summary {
            if summary.expires_at <= now {
                conversation.summary = None;
            }
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn append_message(
        &self,
        user_id: i64,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let seq = {
            let mut next = self.next_seq.write().await;
            *next += 1;
            *next
        };
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.entry(user_id).or_default();
        conversation.turns.push((seq, Turn::new(role, content)));
        Ok(())
    }

    async fn recent_history(
        &self,
        user_id: i64,
        max_messages: usize,
    ) -> Result<Vec<Turn>, StoreError> {
        let now = Utc::now();
        let mut conversations = self.conversations.write().await;
        let Some(conversation) = conversations.get_mut(&user_id) else {
            return Ok(Vec::new());
        };
        self.prune(conversation, now);

        let mut history = Vec::new();
        if let Some(summary) = &conversation.summary {
            history.push(Turn {
                role: Role::System,
                content: summary.content.clone(),
                created_at: summary.updated_at,
            });
        }
        let skip = conversation.turns.len().saturating_sub(max_messages);
        history.extend(conversation.turns.iter().skip(skip).map(|(_, t)| t.clone()));
        Ok(history)
    }

    async fn compact(
        &self,
        user_id: i64,
        max_messages: usize,
        summary_trigger: usize,
        ttl_hours: i64,
        summarizer: &dyn Summarizer,
    ) -> Result<(), StoreError> {
        // Snapshot the older turns under the lock, then release it for the
        // external call.
        let (older, boundary_seq, existing) = {
            let now = Utc::now();
            let mut conversations = self.conversations.write().await;
            let Some(conversation) = conversations.get_mut(&user_id) else {
                return Ok(());
            };
            self.prune(conversation, now);
            if conversation.turns.len() <= summary_trigger {
                return Ok(());
            }
            let split = conversation.turns.len().saturating_sub(max_messages);
            if split == 0 {
                return Ok(());
            }
            let older: Vec<Turn> = conversation.turns[..split]
                .iter()
                .map(|(_, t)| t.clone())
                .collect();
            let boundary_seq = conversation.turns[split - 1].0;
            let existing = conversation.summary.as_ref().map(|s| s.content.clone());
            (older, boundary_seq, existing)
        };

        let new_summary = summarizer
            .summarize(&older, existing.as_deref())
            .await
            .map_err(|e| StoreError::Summarization(e.to_string()))?;

        let now = Utc::now();
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.entry(user_id).or_default();
        conversation.turns.retain(|(seq, _)| *seq > boundary_seq);
        conversation.summary = Some(StoredSummary {
            content: new_summary,
            updated_at: now,
            expires_at: now + Duration::hours(ttl_hours),
        });
        Ok(())
    }
}
