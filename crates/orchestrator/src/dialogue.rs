//! Reminder dialogue state machine.
//!
//! Turns a free-text message plus the LLM's structured extraction into
//! either a scheduled reminder, a follow-up question (missing time or
//! timezone), or a fall-through to the normal reply path.
//!
//! States per user: no pending slot (idle), `awaiting_time`, or
//! `awaiting_timezone`. The slot lives in the database; while one exists,
//! every message from that user is treated as a follow-up answer. Two
//! handlers racing on the same user can still overwrite each other's slot,
//! last writer wins.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use bot_core::timemath::{
    is_valid_timezone, local_to_utc, parse_local_datetime, resolve_timezone_alias,
};
use bot_core::{LanguageModel, Repeat, TaskDispatcher};
use database::models::PendingReminderRow;
use database::reminder::NewReminder;
use database::{pending, profile, reminder, Database};

use crate::error::OrchestratorError;
use crate::sender::ChatTransport;

/// Follow-up question when no concrete time is known yet.
pub(crate) const ASK_WHEN: &str = "Когда именно напомнить? Например: завтра в 9:00.";

/// Follow-up question when the time is known but the timezone is not.
pub(crate) const ASK_TIMEZONE: &str =
    "В каком часовом поясе это время? Напишите город, например: Москва или Europe/Moscow.";

/// Reply when a timezone answer could not be resolved.
pub(crate) const TIMEZONE_NOT_RECOGNIZED: &str =
    "Не удалось распознать часовой пояс. Напишите город, например: Москва или Тель-Авив.";

/// Reply when the requested instant is already in the past.
pub(crate) const ALREADY_PAST: &str = "Это время уже прошло, напоминание не создано.";

/// Cheap pre-filter: only messages containing one of these substrings spend
/// an extraction call. False positives are fine, the extractor rejects them.
const REMINDER_KEYWORDS: &[&str] = &[
    "напомни",
    "напомин",
    "не забыть",
    "remind",
    "завтра",
    "послезавтра",
    "tomorrow",
    "через ",
    "каждый",
    "каждую",
    "каждое",
    "ежедневно",
    "еженедельно",
    "every ",
    "daily",
    "weekly",
    "hourly",
    "monthly",
    "в понедельник",
    "во вторник",
    "в среду",
    "в четверг",
    "в пятницу",
    "в субботу",
    "в воскресенье",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Dialogue state stored in the pending slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Waiting for the user to name a concrete time.
    AwaitingTime,
    /// Time captured; waiting for a resolvable timezone.
    AwaitingTimezone,
}

impl PendingState {
    /// Wire representation used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingState::AwaitingTime => "awaiting_time",
            PendingState::AwaitingTimezone => "awaiting_timezone",
        }
    }

    /// Parse the wire representation.
    pub fn parse(s: &str) -> Option<PendingState> {
        match s {
            "awaiting_time" => Some(PendingState::AwaitingTime),
            "awaiting_timezone" => Some(PendingState::AwaitingTimezone),
            _ => None,
        }
    }
}

/// Is this message worth an extraction call at all?
pub fn is_reminder_candidate(text: &str) -> bool {
    let lowered = text.to_lowercase();
    REMINDER_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Owns the reminder pipeline: the dialogue state machine on the inbound
/// side, delivery and recurrence on the outbound side.
///
/// Constructed only when the durable database is available; without it the
/// orchestrator simply has no reminder capability.
pub struct ReminderService {
    pub(crate) db: Database,
    llm: Arc<dyn LanguageModel>,
    pub(crate) transport: Arc<dyn ChatTransport>,
    pub(crate) dispatcher: Arc<dyn TaskDispatcher>,
    confidence_threshold: f64,
}

impl ReminderService {
    /// Create a service over the given collaborators.
    pub fn new(
        db: Database,
        llm: Arc<dyn LanguageModel>,
        transport: Arc<dyn ChatTransport>,
        dispatcher: Arc<dyn TaskDispatcher>,
        confidence_threshold: f64,
    ) -> Self {
        Self {
            db,
            llm,
            transport,
            dispatcher,
            confidence_threshold,
        }
    }

    /// Run one inbound message through the dialogue.
    ///
    /// `Ok(Some(reply))` short-circuits the normal reply path; `Ok(None)`
    /// means the message is not reminder-related.
    pub async fn handle_message(
        &self,
        user_id: i64,
        chat_id: i64,
        text: &str,
    ) -> Result<Option<String>, OrchestratorError> {
        if let Some(pending_row) = pending::get_pending(self.db.pool(), user_id).await? {
            let reply = self
                .advance_pending(pending_row, user_id, chat_id, text)
                .await?;
            return Ok(Some(reply));
        }

        self.fresh_intent(user_id, chat_id, text).await
    }

    /// Follow-up turn while a pending slot exists.
    async fn advance_pending(
        &self,
        pending_row: PendingReminderRow,
        user_id: i64,
        chat_id: i64,
        text: &str,
    ) -> Result<String, OrchestratorError> {
        let state = PendingState::parse(&pending_row.state).unwrap_or(PendingState::AwaitingTime);
        debug!("Pending reminder for {} in state {}", user_id, state.as_str());

        match state {
            PendingState::AwaitingTimezone => {
                let resolved =
                    resolve_timezone_alias(text).filter(|name| is_valid_timezone(name));
                let Some(tz_name) = resolved else {
                    return Ok(TIMEZONE_NOT_RECOGNIZED.to_string());
                };

                profile::set_timezone(self.db.pool(), user_id, &tz_name).await?;

                match pending_row
                    .datetime_local
                    .as_deref()
                    .and_then(parse_local_datetime)
                {
                    Some(local) => {
                        self.schedule(
                            user_id,
                            chat_id,
                            &pending_row.text,
                            local,
                            &tz_name,
                            Repeat::from_str(&pending_row.repeat).unwrap_or(Repeat::None),
                            &pending_row.original_time_phrase,
                        )
                        .await
                    }
                    None => {
                        // Timezone settled first; circle back for the time.
                        pending::upsert_pending(
                            self.db.pool(),
                            user_id,
                            PendingState::AwaitingTime.as_str(),
                            &pending_row.text,
                            None,
                            &pending_row.repeat,
                            &pending_row.original_time_phrase,
                        )
                        .await?;
                        Ok(ASK_WHEN.to_string())
                    }
                }
            }

            PendingState::AwaitingTime => {
                let tz_name = self.known_timezone(user_id).await?;
                let now_local = self.now_local_iso(tz_name.as_deref());
                let parse = self
                    .llm
                    .parse_reminder(text, tz_name.as_deref(), &now_local)
                    .await?;

                let reminder_text = if parse.text.trim().is_empty() {
                    pending_row.text.clone()
                } else {
                    parse.text.clone()
                };
                let phrase = if parse.original_time_phrase.trim().is_empty() {
                    pending_row.original_time_phrase.clone()
                } else {
                    parse.original_time_phrase.clone()
                };
                let repeat_str = if parse.repeat != "none" {
                    parse.repeat.clone()
                } else {
                    pending_row.repeat.clone()
                };

                let local = parse
                    .datetime_local
                    .as_deref()
                    .and_then(|raw| parse_local_datetime(raw).map(|dt| (raw.to_string(), dt)));

                match local {
                    None => Ok(ASK_WHEN.to_string()),
                    Some((raw, local)) => match tz_name {
                        None => {
                            pending::upsert_pending(
                                self.db.pool(),
                                user_id,
                                PendingState::AwaitingTimezone.as_str(),
                                &reminder_text,
                                Some(&raw),
                                &repeat_str,
                                &phrase,
                            )
                            .await?;
                            Ok(ASK_TIMEZONE.to_string())
                        }
                        Some(tz_name) => {
                            self.schedule(
                                user_id,
                                chat_id,
                                &reminder_text,
                                local,
                                &tz_name,
                                Repeat::from_str(&repeat_str).unwrap_or(Repeat::None),
                                &phrase,
                            )
                            .await
                        }
                    },
                }
            }
        }
    }

    /// First turn of a possible reminder: pre-filter, extract, branch.
    async fn fresh_intent(
        &self,
        user_id: i64,
        chat_id: i64,
        text: &str,
    ) -> Result<Option<String>, OrchestratorError> {
        if !is_reminder_candidate(text) {
            return Ok(None);
        }

        let tz_name = self.known_timezone(user_id).await?;
        let now_local = self.now_local_iso(tz_name.as_deref());
        let parse = self
            .llm
            .parse_reminder(text, tz_name.as_deref(), &now_local)
            .await?;

        if parse.intent != "set_reminder" {
            return Ok(None);
        }

        let reminder_text = if parse.text.trim().is_empty() {
            text.to_string()
        } else {
            parse.text.clone()
        };
        let repeat_str = parse.repeat.clone();

        let local = parse
            .datetime_local
            .as_deref()
            .and_then(parse_local_datetime)
            .filter(|_| parse.confidence >= self.confidence_threshold);

        // Missing or untrusted time: ask for it and hold the intent.
        let Some(local) = local else {
            info!(
                "Reminder intent for {} needs a time (confidence {:.2})",
                user_id, parse.confidence
            );
            pending::upsert_pending(
                self.db.pool(),
                user_id,
                PendingState::AwaitingTime.as_str(),
                &reminder_text,
                None,
                &repeat_str,
                &parse.original_time_phrase,
            )
            .await?;
            return Ok(Some(ASK_WHEN.to_string()));
        };

        match tz_name {
            None => {
                pending::upsert_pending(
                    self.db.pool(),
                    user_id,
                    PendingState::AwaitingTimezone.as_str(),
                    &reminder_text,
                    parse.datetime_local.as_deref(),
                    &repeat_str,
                    &parse.original_time_phrase,
                )
                .await?;
                Ok(Some(ASK_TIMEZONE.to_string()))
            }
            Some(tz_name) => {
                let reply = self
                    .schedule(
                        user_id,
                        chat_id,
                        &reminder_text,
                        local,
                        &tz_name,
                        Repeat::from_str(&repeat_str).unwrap_or(Repeat::None),
                        &parse.original_time_phrase,
                    )
                    .await?;
                Ok(Some(reply))
            }
        }
    }

    /// Persist the reminder, clear the pending slot, arm the dispatcher.
    ///
    /// The dispatcher is best-effort: the row itself is what the sweep
    /// delivers if arming fails.
    #[allow(clippy::too_many_arguments)]
    async fn schedule(
        &self,
        user_id: i64,
        chat_id: i64,
        text: &str,
        local: NaiveDateTime,
        tz_name: &str,
        repeat: Repeat,
        original_time_phrase: &str,
    ) -> Result<String, OrchestratorError> {
        let at_utc = match local_to_utc(local, tz_name) {
            Ok(at) => at,
            Err(e) => {
                // Nonexistent wall-clock time (DST gap): re-ask instead of
                // failing the whole message.
                warn!("Could not place {} in {}: {}", local, tz_name, e);
                pending::upsert_pending(
                    self.db.pool(),
                    user_id,
                    PendingState::AwaitingTime.as_str(),
                    text,
                    None,
                    repeat.as_str(),
                    original_time_phrase,
                )
                .await?;
                return Ok(ASK_WHEN.to_string());
            }
        };

        if at_utc <= Utc::now() {
            pending::clear_pending(self.db.pool(), user_id).await?;
            return Ok(ALREADY_PAST.to_string());
        }

        let new = NewReminder {
            user_id,
            chat_id,
            text: text.to_string(),
            schedule_at_utc: at_utc,
            timezone: tz_name.to_string(),
            repeat: repeat.as_str().to_string(),
            original_time_phrase: original_time_phrase.to_string(),
        };
        let id = reminder::create_reminder(self.db.pool(), &new).await?;
        pending::clear_pending(self.db.pool(), user_id).await?;

        info!("Scheduled reminder {} for {} at {}", id, user_id, at_utc);

        if let Err(e) = self
            .dispatcher
            .schedule_callback(
                "/tasks/remind",
                serde_json::json!({ "reminder_id": id }),
                at_utc,
            )
            .await
        {
            // The sweep will pick the row up.
            warn!("Failed to arm dispatcher for reminder {}: {}", id, e);
        }

        let when = local.format("%d.%m.%Y %H:%M");
        Ok(if repeat == Repeat::None {
            format!("Напоминание создано: {when} ({tz_name}).")
        } else {
            format!(
                "Напоминание создано: {when} ({tz_name}), повтор: {}.",
                repeat.as_str()
            )
        })
    }

    /// The user's stored timezone, if it is still a valid zone name.
    async fn known_timezone(&self, user_id: i64) -> Result<Option<String>, OrchestratorError> {
        Ok(profile::get_timezone(self.db.pool(), user_id)
            .await?
            .filter(|name| is_valid_timezone(name)))
    }

    /// Current wall-clock in the user's zone (UTC when unknown), as the ISO
    /// anchor for relative phrases.
    fn now_local_iso(&self, tz_name: Option<&str>) -> String {
        let now = Utc::now();
        let local = match tz_name.and_then(|name| name.parse::<Tz>().ok()) {
            Some(tz) => now.with_timezone(&tz).naive_local(),
            None => now.naive_utc(),
        };
        local.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}
