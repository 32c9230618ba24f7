//! Shared test doubles for orchestrator tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use bot_core::{
    DispatchError, LanguageModel, LlmError, LlmReply, ReminderParse, Summarizer, TaskDispatcher,
    Turn,
};
use database::Database;

use crate::dialogue::ReminderService;
use crate::error::OrchestratorError;
use crate::sender::ChatTransport;

pub(crate) async fn test_db() -> Database {
    // Every sqlite::memory: connection is its own database, so the test
    // pool must stay on a single connection.
    let db = Database::connect_with_pool_size("sqlite::memory:", 1)
        .await
        .unwrap();
    db.migrate().await.unwrap();
    db
}

/// Language model that replays scripted responses.
#[derive(Default)]
pub(crate) struct ScriptedLlm {
    replies: Mutex<VecDeque<LlmReply>>,
    parses: Mutex<VecDeque<ReminderParse>>,
    fail: Mutex<bool>,
}

impl ScriptedLlm {
    pub fn push_reply(&self, text: &str, model: Option<&str>) {
        self.replies.lock().unwrap().push_back(LlmReply {
            text: text.to_string(),
            model: model.map(|m| m.to_string()),
        });
    }

    pub fn push_parse(&self, parse: ReminderParse) {
        self.parses.lock().unwrap().push_back(parse);
    }

    pub fn fail_next(&self) {
        *self.fail.lock().unwrap() = true;
    }

    fn take_failure(&self) -> bool {
        std::mem::take(&mut *self.fail.lock().unwrap())
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn generate_reply(
        &self,
        _history: &[Turn],
        _user_text: &str,
    ) -> Result<LlmReply, LlmError> {
        if self.take_failure() {
            return Err(LlmError::Network("scripted failure".to_string()));
        }
        Ok(self.replies.lock().unwrap().pop_front().unwrap_or(LlmReply {
            text: "ок".to_string(),
            model: Some("test-model".to_string()),
        }))
    }

    async fn parse_reminder(
        &self,
        _text: &str,
        _timezone: Option<&str>,
        _now_local_iso: &str,
    ) -> Result<ReminderParse, LlmError> {
        if self.take_failure() {
            return Err(LlmError::Network("scripted failure".to_string()));
        }
        Ok(self
            .parses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

#[async_trait]
impl Summarizer for ScriptedLlm {
    async fn summarize(
        &self,
        turns: &[Turn],
        _existing_summary: Option<&str>,
    ) -> Result<String, LlmError> {
        Ok(format!("summary of {} turns", turns.len()))
    }
}

/// Transport that records everything it is told to send.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<(i64, String)>>,
    left: Mutex<Vec<i64>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn left_chats(&self) -> Vec<i64> {
        self.left.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), OrchestratorError> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn leave_chat(&self, chat_id: i64) -> Result<(), OrchestratorError> {
        self.left.lock().unwrap().push(chat_id);
        Ok(())
    }
}

/// Dispatcher that records armed callbacks.
#[derive(Default)]
pub(crate) struct RecordingDispatcher {
    calls: Mutex<Vec<(String, serde_json::Value, DateTime<Utc>)>>,
}

impl RecordingDispatcher {
    pub fn calls(&self) -> Vec<(String, serde_json::Value, DateTime<Utc>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskDispatcher for RecordingDispatcher {
    async fn schedule_callback(
        &self,
        path: &str,
        payload: serde_json::Value,
        at_utc: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), payload, at_utc));
        Ok(())
    }
}

/// Build a [`ReminderService`] over recording collaborators.
pub(crate) fn service_with(
    db: Database,
    llm: ScriptedLlm,
) -> (
    ReminderService,
    Arc<RecordingTransport>,
    Arc<RecordingDispatcher>,
) {
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let service = ReminderService::new(
        db,
        Arc::new(llm),
        transport.clone(),
        dispatcher.clone(),
        0.7,
    );
    (service, transport, dispatcher)
}
