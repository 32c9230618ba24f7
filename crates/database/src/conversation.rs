//! Conversation history persistence.
//!
//! Raw turns live in `conversation_turns`; at most one rolling summary per
//! user lives in `conversation_summaries`. [`SqliteConversationStore`]
//! implements the shared [`ConversationStore`] contract on top of these
//! tables.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use bot_core::{ConversationStore, Role, StoreError, Summarizer, Turn};

use crate::models::TurnRow;
use crate::{decode_ts, encode_ts, Result};

/// Append a turn for a user, expiring `ttl_hours` from now.
pub async fn append_turn(
    pool: &SqlitePool,
    user_id: i64,
    role: &str,
    content: &str,
    ttl_hours: i64,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO conversation_turns (user_id, role, content, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(role)
    .bind(content)
    .bind(encode_ts(now))
    .bind(encode_ts(now + Duration::hours(ttl_hours)))
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete expired turns and summary for a user.
pub async fn prune_expired(pool: &SqlitePool, user_id: i64, now: DateTime<Utc>) -> Result<()> {
    let now = encode_ts(now);
    sqlx::query(
        r#"
        DELETE FROM conversation_turns
        WHERE user_id = ? AND expires_at <= ?
        "#,
    )
    .bind(user_id)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM conversation_summaries
        WHERE user_id = ? AND expires_at <= ?
        "#,
    )
    .bind(user_id)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch the current summary text for a user, if any.
pub async fn get_summary(pool: &SqlitePool, user_id: i64) -> Result<Option<(String, String)>> {
    let row: Option<(String, String)> = sqlx::query_as(
        r#"
        SELECT content, updated_at
        FROM conversation_summaries
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Count the stored turns for a user.
pub async fn count_turns(pool: &SqlitePool, user_id: i64) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM conversation_turns WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Fetch all turns for a user, oldest first.
pub async fn list_turns(pool: &SqlitePool, user_id: i64) -> Result<Vec<TurnRow>> {
    let rows = sqlx::query_as::<_, TurnRow>(
        r#"
        SELECT id, user_id, role, content, created_at, expires_at
        FROM conversation_turns
        WHERE user_id = ?
        ORDER BY id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Durable implementation of the conversation store contract.
#[derive(Debug, Clone)]
pub struct SqliteConversationStore {
    pool: SqlitePool,
    ttl_hours: i64,
}

impl SqliteConversationStore {
    /// Create a store whose turns expire `ttl_hours` after creation.
    pub fn new(pool: SqlitePool, ttl_hours: i64) -> Self {
        Self { pool, ttl_hours }
    }
}

fn turn_from_row(row: &TurnRow) -> Turn {
    Turn {
        role: Role::parse(&row.role).unwrap_or(Role::User),
        content: row.content.clone(),
        created_at: decode_ts(&row.created_at),
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn append_message(
        &self,
        user_id: i64,
        role: Role,
        content: &str,
    ) -> std::result::Result<(), StoreError> {
        append_turn(&self.pool, user_id, role.as_str(), content, self.ttl_hours)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn recent_history(
        &self,
        user_id: i64,
        max_messages: usize,
    ) -> std::result::Result<Vec<Turn>, StoreError> {
        let map_err = |e: crate::DatabaseError| StoreError::Backend(e.to_string());

        prune_expired(&self.pool, user_id, Utc::now())
            .await
            .map_err(map_err)?;

        let mut history = Vec::new();
        if let Some((content, updated_at)) = get_summary(&self.pool, user_id).await.map_err(map_err)? {
            history.push(Turn {
                role: Role::System,
                content,
                created_at: decode_ts(&updated_at),
            });
        }

        let rows = list_turns(&self.pool, user_id).await.map_err(map_err)?;
        let skip = rows.len().saturating_sub(max_messages);
        history.extend(rows[skip..].iter().map(turn_from_row));
        Ok(history)
    }

    async fn compact(
        &self,
        user_id: i64,
        max_messages: usize,
        summary_trigger: usize,
        ttl_hours: i64,
        summarizer: &dyn Summarizer,
    ) -> std::result::Result<(), StoreError> {
        let map_err = |e: crate::DatabaseError| StoreError::Backend(e.to_string());

        prune_expired(&self.pool, user_id, Utc::now())
            .await
            .map_err(map_err)?;

        let rows = list_turns(&self.pool, user_id).await.map_err(map_err)?;
        if rows.len() <= summary_trigger {
            return Ok(());
        }
        let split = rows.len().saturating_sub(max_messages);
        if split == 0 {
            return Ok(());
        }

        // Remember the id boundary so we delete exactly what we summarized,
        // even if new turns land while the summarizer runs.
        let boundary_id = rows[split - 1].id;
        let older: Vec<Turn> = rows[..split].iter().map(turn_from_row).collect();
        let existing = get_summary(&self.pool, user_id)
            .await
            .map_err(map_err)?
            .map(|(content, _)| content);

        let new_summary = summarizer
            .summarize(&older, existing.as_deref())
            .await
            .map_err(|e| StoreError::Summarization(e.to_string()))?;

        let now = Utc::now();
        let sql_err = |e: sqlx::Error| StoreError::Backend(e.to_string());
        let mut tx = self.pool.begin().await.map_err(sql_err)?;

        sqlx::query(
            r#"
            DELETE FROM conversation_turns
            WHERE user_id = ? AND id <= ?
            "#,
        )
        .bind(user_id)
        .bind(boundary_id)
        .execute(&mut *tx)
        .await
        .map_err(sql_err)?;

        sqlx::query(
            r#"
            INSERT INTO conversation_summaries (user_id, content, updated_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                content = excluded.content,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(user_id)
        .bind(&new_summary)
        .bind(encode_ts(now))
        .bind(encode_ts(now + Duration::hours(ttl_hours)))
        .execute(&mut *tx)
        .await
        .map_err(sql_err)?;

        tx.commit().await.map_err(sql_err)?;
        Ok(())
    }
}
