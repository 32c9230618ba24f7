//! User profile storage.
//!
//! Currently just the resolved timezone, set once the reminder dialogue
//! learns it and reused for every later reminder until changed.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::UserProfile;
use crate::{encode_ts, Result};

/// Get a user's profile.
pub async fn get_profile(pool: &SqlitePool, user_id: i64) -> Result<Option<UserProfile>> {
    let record = sqlx::query_as::<_, UserProfile>(
        r#"
        SELECT user_id, timezone, updated_at
        FROM user_profiles
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Get a user's resolved timezone, if one was ever stored.
pub async fn get_timezone(pool: &SqlitePool, user_id: i64) -> Result<Option<String>> {
    Ok(get_profile(pool, user_id).await?.map(|p| p.timezone))
}

/// Set (or replace) a user's timezone.
pub async fn set_timezone(pool: &SqlitePool, user_id: i64, timezone: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_profiles (user_id, timezone, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            timezone = excluded.timezone,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(timezone)
    .bind(encode_ts(Utc::now()))
    .execute(pool)
    .await?;

    Ok(())
}
