//! Pending reminder dialogue state.
//!
//! One slot per user. A new intent overwrites whatever was outstanding;
//! the slot is cleared exactly when a reminder is created or the flow is
//! abandoned.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::PendingReminderRow;
use crate::{encode_ts, Result};

/// Create or overwrite the user's pending slot.
pub async fn upsert_pending(
    pool: &SqlitePool,
    user_id: i64,
    state: &str,
    text: &str,
    datetime_local: Option<&str>,
    repeat: &str,
    original_time_phrase: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO pending_reminders
            (user_id, state, text, datetime_local, repeat, original_time_phrase, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            state = excluded.state,
            text = excluded.text,
            datetime_local = excluded.datetime_local,
            repeat = excluded.repeat,
            original_time_phrase = excluded.original_time_phrase,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(state)
    .bind(text)
    .bind(datetime_local)
    .bind(repeat)
    .bind(original_time_phrase)
    .bind(encode_ts(Utc::now()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch the user's pending slot, if any.
pub async fn get_pending(pool: &SqlitePool, user_id: i64) -> Result<Option<PendingReminderRow>> {
    let record = sqlx::query_as::<_, PendingReminderRow>(
        r#"
        SELECT user_id, state, text, datetime_local, repeat, original_time_phrase, updated_at
        FROM pending_reminders
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Clear the user's pending slot.
///
/// Returns true if a slot existed.
pub async fn clear_pending(pool: &SqlitePool, user_id: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM pending_reminders
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
