//! Main orchestrator that coordinates message processing.

use std::sync::Arc;

use tracing::{debug, info, warn};

use bot_core::{ConversationStore, LanguageModel, Role, Summarizer};
use telegram::{ChatMemberUpdated, Message, Update};

use crate::access;
use crate::calc;
use crate::dialogue::ReminderService;
use crate::error::OrchestratorError;
use crate::sender::ChatTransport;

/// Fixed reply when the foreground path fails for any reason.
pub const TEMPORARY_ERROR_TEXT: &str = "Временная ошибка. Попробуйте ещё раз позже.";

/// Tunables for the message flow.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// The only user the bot answers.
    pub admin_id: i64,
    /// Bot's own username, for mention/reply detection in groups.
    pub bot_username: Option<String>,
    /// Raw-turn budget handed to the LLM and kept after compaction.
    pub history_max_messages: usize,
    /// Stored-turn count that triggers compaction.
    pub summary_trigger: usize,
    /// TTL for turns and summaries.
    pub history_ttl_hours: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            admin_id: 0,
            bot_username: None,
            history_max_messages: 16,
            summary_trigger: 20,
            history_ttl_hours: 168,
        }
    }
}

/// Composes the inbound-message flow: access check, arithmetic fast path,
/// reminder dialogue, LLM reply, history append, detached compaction.
///
/// Owns no persistent state of its own; everything lives behind the store
/// and service seams.
pub struct Orchestrator {
    store: Arc<dyn ConversationStore>,
    llm: Arc<dyn LanguageModel>,
    summarizer: Arc<dyn Summarizer>,
    transport: Arc<dyn ChatTransport>,
    reminders: Option<Arc<ReminderService>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator from its collaborators.
    ///
    /// `reminders` is `None` when no durable database is available; the
    /// capability is resolved here, once, never probed per message.
    pub fn new(
        store: Arc<dyn ConversationStore>,
        llm: Arc<dyn LanguageModel>,
        summarizer: Arc<dyn Summarizer>,
        transport: Arc<dyn ChatTransport>,
        reminders: Option<Arc<ReminderService>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            llm,
            summarizer,
            transport,
            reminders,
            config,
        }
    }

    /// Route one webhook update.
    pub async fn handle_update(&self, update: Update) -> Result<(), OrchestratorError> {
        if let Some(message) = update.message {
            return self.handle_message(message).await;
        }
        if let Some(event) = update.my_chat_member {
            return self.handle_membership(event).await;
        }
        debug!("Ignoring update without message or membership change");
        Ok(())
    }

    /// Handle an inbound chat message end to end.
    pub async fn handle_message(&self, message: Message) -> Result<(), OrchestratorError> {
        let Some(text) = message.text.clone() else {
            return Ok(());
        };
        if !access::should_respond(&message, self.config.bot_username.as_deref(), self.config.admin_id)
        {
            debug!("Ignoring message in chat {}", message.chat.id);
            return Ok(());
        }

        let user_id = message.from.as_ref().map(|u| u.id).unwrap_or_default();
        let chat_id = message.chat.id;

        // Arithmetic never spends a model call and never touches history.
        if let Some(answer) = calc::evaluate(&text) {
            debug!("Arithmetic fast path for chat {}", chat_id);
            return self.transport.send_message(chat_id, &answer).await;
        }

        // The reminder dialogue may short-circuit with a question or a
        // confirmation. Its failures degrade to the fixed error reply and
        // never leave partial state behind.
        if let Some(reminders) = &self.reminders {
            match reminders.handle_message(user_id, chat_id, &text).await {
                Ok(Some(reply)) => return self.transport.send_message(chat_id, &reply).await,
                Ok(None) => {}
                Err(e) => {
                    warn!("Reminder dialogue failed for {}: {}", user_id, e);
                    return self
                        .transport
                        .send_message(chat_id, TEMPORARY_ERROR_TEXT)
                        .await;
                }
            }
        }

        match self.reply_with_llm(user_id, &text).await {
            Ok(reply) => self.transport.send_message(chat_id, &reply).await,
            Err(e) => {
                warn!("Reply generation failed for {}: {}", user_id, e);
                self.transport
                    .send_message(chat_id, TEMPORARY_ERROR_TEXT)
                    .await
            }
        }
    }

    /// Handle a change of the bot's own membership.
    ///
    /// Only joined statuses are acted on; "left"/"kicked" pass through.
    /// Anyone but the admin adding the bot to a chat makes it leave.
    pub async fn handle_membership(
        &self,
        event: ChatMemberUpdated,
    ) -> Result<(), OrchestratorError> {
        if !access::is_joined_status(&event.new_chat_member.status) {
            return Ok(());
        }
        if access::should_leave_chat(&event, self.config.admin_id) {
            info!("Leaving chat {} (added by a non-admin)", event.chat.id);
            return self.transport.leave_chat(event.chat.id).await;
        }
        Ok(())
    }

    /// History read, LLM call, history append, detached compaction.
    ///
    /// Nothing is appended unless the model call succeeded, so a failed
    /// call leaves no partial state.
    async fn reply_with_llm(&self, user_id: i64, text: &str) -> Result<String, OrchestratorError> {
        let history = self
            .store
            .recent_history(user_id, self.config.history_max_messages)
            .await?;

        let reply = self.llm.generate_reply(&history, text).await?;

        self.store.append_message(user_id, Role::User, text).await?;
        self.store
            .append_message(user_id, Role::Assistant, &reply.text)
            .await?;

        self.spawn_compaction(user_id);

        Ok(match &reply.model {
            Some(model) => format!("{}\n\n— model: {}", reply.text, model),
            None => reply.text,
        })
    }

    /// Fire-and-forget compaction with its own error boundary; the reply
    /// already went out and must not be affected.
    fn spawn_compaction(&self, user_id: i64) {
        let store = self.store.clone();
        let summarizer = self.summarizer.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            if let Err(e) = run_compaction(store, summarizer, user_id, &config).await {
                warn!("Background compaction failed for {}: {}", user_id, e);
            }
        });
    }
}

/// One compaction pass over a user's history.
async fn run_compaction(
    store: Arc<dyn ConversationStore>,
    summarizer: Arc<dyn Summarizer>,
    user_id: i64,
    config: &OrchestratorConfig,
) -> Result<(), OrchestratorError> {
    store
        .compact(
            user_id,
            config.history_max_messages,
            config.summary_trigger,
            config.history_ttl_hours,
            summarizer.as_ref(),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{service_with, test_db, RecordingTransport, ScriptedLlm};
    use bot_core::{MemoryStore, ReminderParse};
    use telegram::{Chat, ChatMember, TgUser};

    const ADMIN_ID: i64 = 100013433;

    fn admin_message(text: &str) -> Message {
        Message {
            message_id: 1,
            from: Some(TgUser {
                id: ADMIN_ID,
                is_bot: false,
                username: Some("admin".to_string()),
                first_name: None,
            }),
            chat: Chat {
                id: ADMIN_ID,
                kind: "private".to_string(),
                title: None,
            },
            text: Some(text.to_string()),
            reply_to_message: None,
        }
    }

    struct Fixture {
        orchestrator: Orchestrator,
        transport: Arc<RecordingTransport>,
        store: Arc<MemoryStore>,
    }

    fn fixture_with(llm: ScriptedLlm, reminders: Option<Arc<ReminderService>>) -> Fixture {
        let store = Arc::new(MemoryStore::new(24));
        let transport = Arc::new(RecordingTransport::default());
        let llm = Arc::new(llm);
        let orchestrator = Orchestrator::new(
            store.clone(),
            llm.clone(),
            llm,
            transport.clone(),
            reminders,
            OrchestratorConfig {
                admin_id: ADMIN_ID,
                bot_username: Some("sova_bot".to_string()),
                ..OrchestratorConfig::default()
            },
        );
        Fixture {
            orchestrator,
            transport,
            store,
        }
    }

    #[tokio::test]
    async fn test_non_admin_is_ignored() {
        let fixture = fixture_with(ScriptedLlm::default(), None);
        let mut message = admin_message("hello");
        message.from.as_mut().unwrap().id = 999;

        fixture.orchestrator.handle_message(message).await.unwrap();
        assert!(fixture.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_arithmetic_fast_path_skips_model_and_history() {
        let fixture = fixture_with(ScriptedLlm::default(), None);

        fixture
            .orchestrator
            .handle_message(admin_message("2+2="))
            .await
            .unwrap();

        let sent = fixture.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "4");
        assert!(fixture
            .store
            .recent_history(ADMIN_ID, 16)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_llm_reply_appends_history_and_attributes_model() {
        let llm = ScriptedLlm::default();
        llm.push_reply("Привет!", Some("gpt-4.1"));
        let fixture = fixture_with(llm, None);

        fixture
            .orchestrator
            .handle_message(admin_message("привет"))
            .await
            .unwrap();

        let sent = fixture.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Привет!\n\n— model: gpt-4.1");

        let history = fixture.store.recent_history(ADMIN_ID, 16).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "привет");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Привет!");
    }

    #[tokio::test]
    async fn test_llm_reply_without_model_has_no_attribution() {
        let llm = ScriptedLlm::default();
        llm.push_reply("hi", None);
        let fixture = fixture_with(llm, None);

        fixture
            .orchestrator
            .handle_message(admin_message("hey"))
            .await
            .unwrap();

        assert_eq!(fixture.transport.sent()[0].1, "hi");
    }

    #[tokio::test]
    async fn test_llm_failure_sends_fixed_error_and_writes_nothing() {
        let llm = ScriptedLlm::default();
        llm.fail_next();
        let fixture = fixture_with(llm, None);

        fixture
            .orchestrator
            .handle_message(admin_message("привет"))
            .await
            .unwrap();

        let sent = fixture.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, TEMPORARY_ERROR_TEXT);
        assert!(fixture
            .store
            .recent_history(ADMIN_ID, 16)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_reminder_short_circuit() {
        let db = test_db().await;
        let dialogue_llm = ScriptedLlm::default();
        dialogue_llm.push_parse(ReminderParse {
            intent: "set_reminder".to_string(),
            text: "позвонить маме".to_string(),
            datetime_local: None,
            repeat: "none".to_string(),
            confidence: 0.9,
            original_time_phrase: String::new(),
        });
        let (service, _service_transport, _dispatcher) = service_with(db, dialogue_llm);
        let fixture = fixture_with(ScriptedLlm::default(), Some(Arc::new(service)));

        fixture
            .orchestrator
            .handle_message(admin_message("напомни позвонить маме"))
            .await
            .unwrap();

        let sent = fixture.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, crate::dialogue::ASK_WHEN);
        // The dialogue answered; no LLM reply, no history.
        assert!(fixture
            .store
            .recent_history(ADMIN_ID, 16)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_reminder_dialogue_failure_degrades_to_fixed_error() {
        let db = test_db().await;
        let dialogue_llm = ScriptedLlm::default();
        dialogue_llm.fail_next();
        let (service, _service_transport, _dispatcher) = service_with(db, dialogue_llm);
        let fixture = fixture_with(ScriptedLlm::default(), Some(Arc::new(service)));

        fixture
            .orchestrator
            .handle_message(admin_message("напомни позвонить маме"))
            .await
            .unwrap();

        assert_eq!(fixture.transport.sent()[0].1, TEMPORARY_ERROR_TEXT);
    }

    #[tokio::test]
    async fn test_without_reminder_capability_candidates_go_to_llm() {
        let llm = ScriptedLlm::default();
        llm.push_reply("просто поболтаем", Some("m"));
        let fixture = fixture_with(llm, None);

        fixture
            .orchestrator
            .handle_message(admin_message("напомни мне потом"))
            .await
            .unwrap();

        assert!(fixture.transport.sent()[0].1.starts_with("просто поболтаем"));
    }

    #[tokio::test]
    async fn test_membership_leave_for_stranger() {
        let fixture = fixture_with(ScriptedLlm::default(), None);
        let event = ChatMemberUpdated {
            chat: Chat {
                id: -55,
                kind: "group".to_string(),
                title: None,
            },
            from: Some(TgUser {
                id: 999,
                is_bot: false,
                username: None,
                first_name: None,
            }),
            new_chat_member: ChatMember {
                status: "member".to_string(),
                user: None,
            },
        };

        fixture.orchestrator.handle_membership(event).await.unwrap();
        assert_eq!(fixture.transport.left_chats(), vec![-55]);
    }

    #[tokio::test]
    async fn test_membership_left_status_is_ignored() {
        let fixture = fixture_with(ScriptedLlm::default(), None);
        let event = ChatMemberUpdated {
            chat: Chat {
                id: -55,
                kind: "group".to_string(),
                title: None,
            },
            from: Some(TgUser {
                id: 999,
                is_bot: false,
                username: None,
                first_name: None,
            }),
            new_chat_member: ChatMember {
                status: "left".to_string(),
                user: None,
            },
        };

        fixture.orchestrator.handle_membership(event).await.unwrap();
        assert!(fixture.transport.left_chats().is_empty());
    }

    #[tokio::test]
    async fn test_membership_by_admin_stays() {
        let fixture = fixture_with(ScriptedLlm::default(), None);
        let event = ChatMemberUpdated {
            chat: Chat {
                id: -55,
                kind: "group".to_string(),
                title: None,
            },
            from: Some(TgUser {
                id: ADMIN_ID,
                is_bot: false,
                username: None,
                first_name: None,
            }),
            new_chat_member: ChatMember {
                status: "administrator".to_string(),
                user: None,
            },
        };

        fixture.orchestrator.handle_membership(event).await.unwrap();
        assert!(fixture.transport.left_chats().is_empty());
    }

    #[tokio::test]
    async fn test_compaction_pass_bounds_history() {
        let store = Arc::new(MemoryStore::new(24));
        let llm = Arc::new(ScriptedLlm::default());
        for i in 0..25 {
            store
                .append_message(ADMIN_ID, Role::User, &format!("msg{i}"))
                .await
                .unwrap();
        }

        let config = OrchestratorConfig {
            admin_id: ADMIN_ID,
            ..OrchestratorConfig::default()
        };
        run_compaction(store.clone(), llm, ADMIN_ID, &config)
            .await
            .unwrap();

        let history = store.recent_history(ADMIN_ID, 16).await.unwrap();
        assert_eq!(history.len(), 17); // summary + 16 raw turns
        assert_eq!(history[0].role, Role::System);
        assert!(history[0].content.contains("summary of 9 turns"));
    }
}
