//! Reminder persistence.
//!
//! One row per firing occasion. Delivery claims a row by flipping
//! `status` from "scheduled" to "sent" in a single conditional UPDATE; a
//! concurrent claim for the same id affects zero rows and no-ops, which is
//! the idempotence guard for callback-vs-sweep races.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::Reminder;
use crate::{encode_ts, DatabaseError, Result};

/// Fields of a reminder about to be created.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub user_id: i64,
    pub chat_id: i64,
    pub text: String,
    pub schedule_at_utc: DateTime<Utc>,
    pub timezone: String,
    pub repeat: String,
    pub original_time_phrase: String,
}

/// Insert a new scheduled reminder, returning its generated id.
pub async fn create_reminder(pool: &SqlitePool, new: &NewReminder) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO reminders
            (id, user_id, chat_id, text, schedule_at_utc, timezone, repeat,
             status, created_at, original_time_phrase)
        VALUES (?, ?, ?, ?, ?, ?, ?, 'scheduled', ?, ?)
        "#,
    )
    .bind(&id)
    .bind(new.user_id)
    .bind(new.chat_id)
    .bind(&new.text)
    .bind(encode_ts(new.schedule_at_utc))
    .bind(&new.timezone)
    .bind(&new.repeat)
    .bind(encode_ts(Utc::now()))
    .bind(&new.original_time_phrase)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Fetch a reminder by id.
pub async fn get_reminder(pool: &SqlitePool, id: &str) -> Result<Option<Reminder>> {
    let record = sqlx::query_as::<_, Reminder>(
        r#"
        SELECT id, user_id, chat_id, text, schedule_at_utc, timezone, repeat,
               status, created_at, sent_at, original_time_phrase
        FROM reminders
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Fetch a reminder by id, erroring when it does not exist.
pub async fn require_reminder(pool: &SqlitePool, id: &str) -> Result<Reminder> {
    get_reminder(pool, id).await?.ok_or(DatabaseError::NotFound {
        entity: "reminder",
        id: id.to_string(),
    })
}

/// Atomically claim a scheduled reminder for delivery.
///
/// Returns `true` when this caller won the claim; `false` means another
/// delivery path already handled the row.
pub async fn claim_for_delivery(
    pool: &SqlitePool,
    id: &str,
    sent_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE reminders
        SET status = 'sent', sent_at = ?
        WHERE id = ? AND status = 'scheduled'
        "#,
    )
    .bind(encode_ts(sent_at))
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// List scheduled reminders due at or before `now`, oldest due first.
pub async fn list_due(pool: &SqlitePool, now: DateTime<Utc>, limit: i64) -> Result<Vec<Reminder>> {
    let rows = sqlx::query_as::<_, Reminder>(
        r#"
        SELECT id, user_id, chat_id, text, schedule_at_utc, timezone, repeat,
               status, created_at, sent_at, original_time_phrase
        FROM reminders
        WHERE status = 'scheduled' AND schedule_at_utc <= ?
        ORDER BY schedule_at_utc
        LIMIT ?
        "#,
    )
    .bind(encode_ts(now))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_db;
    use chrono::Duration;

    fn sample(at: DateTime<Utc>) -> NewReminder {
        NewReminder {
            user_id: 7,
            chat_id: 7,
            text: "drink water".to_string(),
            schedule_at_utc: at,
            timezone: "Europe/Moscow".to_string(),
            repeat: "none".to_string(),
            original_time_phrase: "in an hour".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = test_db().await;
        let at = Utc::now() + Duration::hours(1);

        let id = create_reminder(db.pool(), &sample(at)).await.unwrap();
        let reminder = get_reminder(db.pool(), &id).await.unwrap().unwrap();

        assert_eq!(reminder.status, Reminder::STATUS_SCHEDULED);
        assert_eq!(reminder.text, "drink water");
        assert_eq!(reminder.schedule_at().timestamp(), at.timestamp());
        assert!(reminder.sent_at.is_none());
    }

    #[tokio::test]
    async fn test_require_reminder_missing() {
        let db = test_db().await;
        let result = require_reminder(db.pool(), "no-such-id").await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_claim_is_single_winner() {
        let db = test_db().await;
        let id = create_reminder(db.pool(), &sample(Utc::now())).await.unwrap();

        assert!(claim_for_delivery(db.pool(), &id, Utc::now()).await.unwrap());
        // Second claim observes status = sent and loses.
        assert!(!claim_for_delivery(db.pool(), &id, Utc::now()).await.unwrap());

        let reminder = get_reminder(db.pool(), &id).await.unwrap().unwrap();
        assert_eq!(reminder.status, Reminder::STATUS_SENT);
        assert!(reminder.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_list_due_filters_and_orders() {
        let db = test_db().await;
        let now = Utc::now();

        let early = create_reminder(db.pool(), &sample(now - Duration::hours(2)))
            .await
            .unwrap();
        let late = create_reminder(db.pool(), &sample(now - Duration::hours(1)))
            .await
            .unwrap();
        // Future reminder must not appear.
        create_reminder(db.pool(), &sample(now + Duration::hours(1)))
            .await
            .unwrap();
        // Delivered reminder must not appear.
        let sent = create_reminder(db.pool(), &sample(now - Duration::hours(3)))
            .await
            .unwrap();
        claim_for_delivery(db.pool(), &sent, now).await.unwrap();

        let due = list_due(db.pool(), now, 50).await.unwrap();
        let ids: Vec<_> = due.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![early.as_str(), late.as_str()]);
    }

    #[tokio::test]
    async fn test_list_due_respects_limit() {
        let db = test_db().await;
        let now = Utc::now();
        for i in 0..5 {
            create_reminder(db.pool(), &sample(now - Duration::minutes(i)))
                .await
                .unwrap();
        }

        let due = list_due(db.pool(), now, 3).await.unwrap();
        assert_eq!(due.len(), 3);
    }
}
