//! Reminder delivery and recurrence.
//!
//! Two trigger paths feed the same routine: the external scheduler's direct
//! callback and the periodic sweep. At-least-once overall; per-row
//! idempotence comes from the status compare-and-swap in the database, so
//! the row is claimed *before* the notification goes out and a racing
//! second path no-ops.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use bot_core::timemath::advance_by_recurrence;
use bot_core::Repeat;
use database::models::Reminder;
use database::reminder::{self, NewReminder};

use crate::dialogue::ReminderService;
use crate::error::OrchestratorError;

/// Overdue notice with the user's original time phrase.
fn overdue_text(reminder: &Reminder) -> String {
    if reminder.original_time_phrase.is_empty() {
        format!("Просроченное напоминание.\n{}", reminder.text)
    } else {
        format!(
            "Просроченное напоминание (было: {}).\n{}",
            reminder.original_time_phrase, reminder.text
        )
    }
}

/// Result of a direct delivery attempt, mapped to HTTP by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The notification went out just now.
    Delivered,
    /// Another path already delivered this id; nothing to do.
    AlreadyHandled,
    /// The scheduled instant is still in the future.
    NotDue,
    /// No reminder with this id exists.
    NotFound,
}

impl ReminderService {
    /// How many due rows one sweep invocation handles at most.
    pub const SWEEP_BATCH_SIZE: i64 = 50;

    /// Deliver one reminder by id (direct scheduler callback path).
    pub async fn deliver_reminder(
        &self,
        reminder_id: &str,
    ) -> Result<DeliveryOutcome, OrchestratorError> {
        let Some(row) = reminder::get_reminder(self.db.pool(), reminder_id).await? else {
            return Ok(DeliveryOutcome::NotFound);
        };
        if row.status != Reminder::STATUS_SCHEDULED {
            return Ok(DeliveryOutcome::AlreadyHandled);
        }

        let now = Utc::now();
        if row.schedule_at() > now {
            return Ok(DeliveryOutcome::NotDue);
        }

        if self.fire(&row, now).await? {
            Ok(DeliveryOutcome::Delivered)
        } else {
            Ok(DeliveryOutcome::AlreadyHandled)
        }
    }

    /// Deliver every due reminder, up to the batch size. Returns how many
    /// notifications went out; per-row failures are logged and skipped so
    /// one bad row cannot wedge the sweep.
    pub async fn sweep_due(&self) -> Result<usize, OrchestratorError> {
        let now = Utc::now();
        let due = reminder::list_due(self.db.pool(), now, Self::SWEEP_BATCH_SIZE).await?;

        let mut sent = 0;
        for row in due {
            match self.fire(&row, now).await {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(e) => warn!("Sweep delivery failed for reminder {}: {}", row.id, e),
            }
        }
        Ok(sent)
    }

    /// Claim, notify, re-arm recurrence. `Ok(false)` means another path won
    /// the claim.
    async fn fire(&self, row: &Reminder, now: DateTime<Utc>) -> Result<bool, OrchestratorError> {
        if !reminder::claim_for_delivery(self.db.pool(), &row.id, now).await? {
            return Ok(false);
        }

        let text = if row.schedule_at() < now {
            overdue_text(row)
        } else {
            row.text.clone()
        };
        self.transport.send_message(row.chat_id, &text).await?;
        info!("Delivered reminder {} to chat {}", row.id, row.chat_id);

        self.rearm_recurrence(row).await?;
        Ok(true)
    }

    /// Insert the next occurrence of a recurring reminder and arm a
    /// callback for it. Dispatcher failure is logged and swallowed; the
    /// new row stays discoverable by the sweep.
    async fn rearm_recurrence(&self, row: &Reminder) -> Result<(), OrchestratorError> {
        let repeat = row.repeat();
        if repeat == Repeat::None {
            return Ok(());
        }
        let Some(next_at) = advance_by_recurrence(row.schedule_at(), repeat, &row.timezone) else {
            warn!(
                "Could not advance reminder {} ({} in {})",
                row.id, row.repeat, row.timezone
            );
            return Ok(());
        };

        let new = NewReminder {
            user_id: row.user_id,
            chat_id: row.chat_id,
            text: row.text.clone(),
            schedule_at_utc: next_at,
            timezone: row.timezone.clone(),
            repeat: row.repeat.clone(),
            original_time_phrase: row.original_time_phrase.clone(),
        };
        let new_id = reminder::create_reminder(self.db.pool(), &new).await?;
        info!(
            "Re-armed recurring reminder {} as {} at {}",
            row.id, new_id, next_at
        );

        if let Err(e) = self
            .dispatcher
            .schedule_callback(
                "/tasks/remind",
                serde_json::json!({ "reminder_id": new_id }),
                next_at,
            )
            .await
        {
            warn!("Failed to arm dispatcher for reminder {}: {}", new_id, e);
        }
        Ok(())
    }
}
