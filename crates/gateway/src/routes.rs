//! HTTP surface: Telegram webhook, reminder delivery callback, sweep.
//!
//! Every endpoint is guarded by an exact-match shared-secret header; an
//! unconfigured secret disables the corresponding check. The webhook always
//! answers 200 to authorized requests because Telegram retries anything
//! else, even for payloads we cannot parse.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::warn;

use orchestrator::{DeliveryOutcome, Orchestrator, ReminderService};
use telegram::Update;

/// Header Telegram echoes the webhook secret in.
const WEBHOOK_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Header the task scheduler echoes the shared token in.
const TASKS_TOKEN_HEADER: &str = "x-tasks-token";

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub reminders: Option<Arc<ReminderService>>,
    pub webhook_secret: Option<String>,
    pub tasks_token: Option<String>,
}

/// Build the router.
pub fn router(state: AppState, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(webhook))
        .route("/tasks/remind", post(tasks_remind))
        .route("/tasks/sweep", post(tasks_sweep))
        .route("/health", get(health))
        .with_state(state)
}

/// Exact-match header check; no configured secret disables the check.
fn header_matches(headers: &HeaderMap, name: &str, expected: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value == expected)
            .unwrap_or(false),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    if !header_matches(&headers, WEBHOOK_SECRET_HEADER, state.webhook_secret.as_deref()) {
        return StatusCode::UNAUTHORIZED;
    }

    let update: Update = match serde_json::from_value(body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Dropping unparseable webhook update: {}", e);
            return StatusCode::OK;
        }
    };

    // Answer Telegram immediately; each update is handled by its own task.
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.handle_update(update).await {
            warn!("Update handling failed: {}", e);
        }
    });

    StatusCode::OK
}

fn outcome_response(outcome: DeliveryOutcome) -> (StatusCode, &'static str) {
    match outcome {
        DeliveryOutcome::Delivered => (StatusCode::OK, "ok"),
        DeliveryOutcome::AlreadyHandled => (StatusCode::OK, "already handled"),
        DeliveryOutcome::NotDue => (StatusCode::OK, "not due"),
        DeliveryOutcome::NotFound => (StatusCode::NOT_FOUND, "not found"),
    }
}

async fn tasks_remind(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if !header_matches(&headers, TASKS_TOKEN_HEADER, state.tasks_token.as_deref()) {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    let Some(reminders) = &state.reminders else {
        return (StatusCode::NOT_FOUND, "reminders disabled").into_response();
    };
    let Some(reminder_id) = body.get("reminder_id").and_then(|v| v.as_str()) else {
        return (StatusCode::BAD_REQUEST, "missing reminder_id").into_response();
    };

    match reminders.deliver_reminder(reminder_id).await {
        Ok(outcome) => outcome_response(outcome).into_response(),
        Err(e) => {
            warn!("Reminder delivery failed for {}: {}", reminder_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "delivery failed").into_response()
        }
    }
}

async fn tasks_sweep(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !header_matches(&headers, TASKS_TOKEN_HEADER, state.tasks_token.as_deref()) {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    let Some(reminders) = &state.reminders else {
        return (StatusCode::NOT_FOUND, "reminders disabled").into_response();
    };

    match reminders.sweep_due().await {
        Ok(sent) => Json(serde_json::json!({ "sent": sent })).into_response(),
        Err(e) => {
            warn!("Sweep failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "sweep failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bot_core::{
        LanguageModel, LlmError, LlmReply, MemoryStore, NoopDispatcher, ReminderParse, Summarizer,
        Turn,
    };
    use chrono::{Duration, Utc};
    use database::reminder::{self, NewReminder};
    use database::Database;
    use orchestrator::{NoopTransport, OrchestratorConfig};

    struct StubLlm;

    #[async_trait]
    impl LanguageModel for StubLlm {
        async fn generate_reply(
            &self,
            _history: &[Turn],
            _user_text: &str,
        ) -> Result<LlmReply, LlmError> {
            Ok(LlmReply {
                text: "ok".to_string(),
                model: None,
            })
        }

        async fn parse_reminder(
            &self,
            _text: &str,
            _timezone: Option<&str>,
            _now_local_iso: &str,
        ) -> Result<ReminderParse, LlmError> {
            Ok(ReminderParse::default())
        }
    }

    #[async_trait]
    impl Summarizer for StubLlm {
        async fn summarize(
            &self,
            _turns: &[Turn],
            _existing_summary: Option<&str>,
        ) -> Result<String, LlmError> {
            Ok("summary".to_string())
        }
    }

    async fn state_with_db() -> (AppState, Database) {
        // Every sqlite::memory: connection is its own database, so the test
        // pool must stay on a single connection.
        let db = Database::connect_with_pool_size("sqlite::memory:", 1)
            .await
            .unwrap();
        db.migrate().await.unwrap();

        let llm = Arc::new(StubLlm);
        let transport = Arc::new(NoopTransport);
        let reminders = Arc::new(ReminderService::new(
            db.clone(),
            llm.clone(),
            transport.clone(),
            Arc::new(NoopDispatcher),
            0.7,
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(MemoryStore::new(24)),
            llm.clone(),
            llm,
            transport,
            Some(reminders.clone()),
            OrchestratorConfig::default(),
        ));

        (
            AppState {
                orchestrator,
                reminders: Some(reminders),
                webhook_secret: Some("hook-secret".to_string()),
                tasks_token: Some("task-secret".to_string()),
            },
            db,
        )
    }

    fn headers_with(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_header_matches() {
        let headers = headers_with(TASKS_TOKEN_HEADER, "secret");
        assert!(header_matches(&headers, TASKS_TOKEN_HEADER, Some("secret")));
        assert!(!header_matches(&headers, TASKS_TOKEN_HEADER, Some("other")));
        assert!(!header_matches(
            &HeaderMap::new(),
            TASKS_TOKEN_HEADER,
            Some("secret")
        ));
        // No configured token disables the check entirely.
        assert!(header_matches(&HeaderMap::new(), TASKS_TOKEN_HEADER, None));
    }

    #[test]
    fn test_outcome_responses() {
        assert_eq!(
            outcome_response(DeliveryOutcome::Delivered),
            (StatusCode::OK, "ok")
        );
        assert_eq!(
            outcome_response(DeliveryOutcome::AlreadyHandled),
            (StatusCode::OK, "already handled")
        );
        assert_eq!(
            outcome_response(DeliveryOutcome::NotDue),
            (StatusCode::OK, "not due")
        );
        assert_eq!(
            outcome_response(DeliveryOutcome::NotFound),
            (StatusCode::NOT_FOUND, "not found")
        );
    }

    #[tokio::test]
    async fn test_tasks_remind_auth() {
        let (state, _db) = state_with_db().await;

        let response = tasks_remind(
            State(state.clone()),
            HeaderMap::new(),
            Json(serde_json::json!({"reminder_id": "x"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = tasks_remind(
            State(state),
            headers_with(TASKS_TOKEN_HEADER, "wrong"),
            Json(serde_json::json!({"reminder_id": "x"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_tasks_remind_missing_and_unknown_id() {
        let (state, _db) = state_with_db().await;
        let auth = || headers_with(TASKS_TOKEN_HEADER, "task-secret");

        let response = tasks_remind(
            State(state.clone()),
            auth(),
            Json(serde_json::json!({})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = tasks_remind(
            State(state),
            auth(),
            Json(serde_json::json!({"reminder_id": "no-such"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tasks_remind_not_due_and_delivered() {
        let (state, db) = state_with_db().await;
        let auth = || headers_with(TASKS_TOKEN_HEADER, "task-secret");

        let future_id = reminder::create_reminder(
            db.pool(),
            &NewReminder {
                user_id: 1,
                chat_id: 1,
                text: "later".to_string(),
                schedule_at_utc: Utc::now() + Duration::hours(1),
                timezone: "Europe/Moscow".to_string(),
                repeat: "none".to_string(),
                original_time_phrase: String::new(),
            },
        )
        .await
        .unwrap();

        let response = tasks_remind(
            State(state.clone()),
            auth(),
            Json(serde_json::json!({"reminder_id": future_id})),
        )
        .await;
        // Not yet due: 200 no-op so the scheduler does not retry forever.
        assert_eq!(response.status(), StatusCode::OK);

        let due_id = reminder::create_reminder(
            db.pool(),
            &NewReminder {
                user_id: 1,
                chat_id: 1,
                text: "now".to_string(),
                schedule_at_utc: Utc::now() - Duration::minutes(1),
                timezone: "Europe/Moscow".to_string(),
                repeat: "none".to_string(),
                original_time_phrase: String::new(),
            },
        )
        .await
        .unwrap();

        let response = tasks_remind(
            State(state),
            auth(),
            Json(serde_json::json!({"reminder_id": due_id})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let row = reminder::get_reminder(db.pool(), &due_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "sent");
    }

    #[tokio::test]
    async fn test_tasks_sweep_counts_sent() {
        let (state, db) = state_with_db().await;

        for _ in 0..2 {
            reminder::create_reminder(
                db.pool(),
                &NewReminder {
                    user_id: 1,
                    chat_id: 1,
                    text: "due".to_string(),
                    schedule_at_utc: Utc::now() - Duration::minutes(5),
                    timezone: "Europe/Moscow".to_string(),
                    repeat: "none".to_string(),
                    original_time_phrase: String::new(),
                },
            )
            .await
            .unwrap();
        }

        let response = tasks_sweep(
            State(state),
            headers_with(TASKS_TOKEN_HEADER, "task-secret"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_auth_and_junk_tolerance() {
        let (state, _db) = state_with_db().await;

        let status = webhook(
            State(state.clone()),
            HeaderMap::new(),
            Json(serde_json::json!({"update_id": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Authorized junk is dropped with a 200 so Telegram stops retrying.
        let status = webhook(
            State(state),
            headers_with(WEBHOOK_SECRET_HEADER, "hook-secret"),
            Json(serde_json::json!({"nonsense": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}
