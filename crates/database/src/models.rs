//! Database models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use bot_core::Repeat;

/// A stored conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TurnRow {
    /// Auto-incrementing ID; insertion order is conversation order.
    pub id: i64,
    /// Telegram user the conversation belongs to.
    pub user_id: i64,
    /// Role: "user", "assistant", or "system".
    pub role: String,
    /// Message content.
    pub content: String,
    /// Creation timestamp (RFC 3339 UTC).
    pub created_at: String,
    /// Expiry timestamp (RFC 3339 UTC).
    pub expires_at: String,
}

/// A scheduled (or delivered) reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Reminder {
    /// UUID string.
    pub id: String,
    /// Telegram user who owns the reminder.
    pub user_id: i64,
    /// Chat to deliver into.
    pub chat_id: i64,
    /// What to remind about.
    pub text: String,
    /// Scheduled firing instant (RFC 3339 UTC).
    pub schedule_at_utc: String,
    /// IANA timezone the schedule was expressed in.
    pub timezone: String,
    /// Recurrence wire word ("none", "hourly", ...).
    pub repeat: String,
    /// "scheduled" until delivered, then "sent".
    pub status: String,
    /// Creation timestamp (RFC 3339 UTC).
    pub created_at: String,
    /// Delivery timestamp, once sent.
    pub sent_at: Option<String>,
    /// The time phrase as the user wrote it, for overdue notices.
    pub original_time_phrase: String,
}

impl Reminder {
    /// Status value of a not-yet-delivered reminder.
    pub const STATUS_SCHEDULED: &'static str = "scheduled";
    /// Status value of a delivered reminder.
    pub const STATUS_SENT: &'static str = "sent";

    /// Parsed scheduled instant; the epoch if the stored value is corrupt.
    pub fn schedule_at(&self) -> DateTime<Utc> {
        crate::decode_ts(&self.schedule_at_utc)
    }

    /// Parsed recurrence; unrecognized values behave as no recurrence.
    pub fn repeat(&self) -> Repeat {
        self.repeat.parse().unwrap_or(Repeat::None)
    }
}

/// In-progress reminder dialogue state, one active slot per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PendingReminderRow {
    /// Owning user; also the primary key (one slot each).
    pub user_id: i64,
    /// Dialogue state: "awaiting_time" or "awaiting_timezone".
    pub state: String,
    /// What to remind about.
    pub text: String,
    /// Local naive datetime captured so far, if any.
    pub datetime_local: Option<String>,
    /// Recurrence wire word.
    pub repeat: String,
    /// The time phrase as the user wrote it.
    pub original_time_phrase: String,
    /// Last mutation timestamp (RFC 3339 UTC).
    pub updated_at: String,
}

/// User profile settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    /// Telegram user id.
    pub user_id: i64,
    /// Resolved IANA timezone name.
    pub timezone: String,
    /// Last update timestamp (RFC 3339 UTC).
    pub updated_at: String,
}
