//! Sova gateway binary: configuration, wiring, HTTP serving.

use std::sync::Arc;

use tracing::{info, warn};

use bot_core::{ConversationStore, LanguageModel, MemoryStore, NoopDispatcher, Summarizer, TaskDispatcher};
use database::{Database, SqliteConversationStore};
use openai_brain::OpenAiBrain;
use orchestrator::{
    ChatTransport, DispatchRouting, HttpTaskDispatcher, Orchestrator, OrchestratorConfig,
    ReminderService,
};
use telegram::TelegramBot;

mod config;
mod routes;

use config::GatewayConfig;
use routes::AppState;

fn fatal(message: &str) -> ! {
    eprintln!("fatal: {message}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env().unwrap_or_else(|e| fatal(&e.to_string()));

    let brain = Arc::new(OpenAiBrain::from_env().unwrap_or_else(|e| fatal(&e.to_string())));
    let llm: Arc<dyn LanguageModel> = brain.clone();
    let summarizer: Arc<dyn Summarizer> = brain;

    let bot = Arc::new(TelegramBot::new(&config.bot_token));
    let transport: Arc<dyn ChatTransport> = bot.clone();

    // The bot username drives mention/reply detection in groups; the bot
    // still works for private chats if this lookup fails at boot.
    let bot_username = match bot.get_me().await {
        Ok(me) => me.username,
        Err(e) => {
            warn!("Could not resolve bot username: {}", e);
            None
        }
    };

    // Reminder capability is resolved here, once: it exists only with a
    // durable database behind it.
    let (store, reminders): (Arc<dyn ConversationStore>, Option<Arc<ReminderService>>) =
        if config.database_disabled {
            info!("Database disabled; using in-memory history, reminders off");
            (
                Arc::new(MemoryStore::new(config.history_ttl_hours)),
                None,
            )
        } else {
            let db = Database::connect(&config.database_url)
                .await
                .unwrap_or_else(|e| fatal(&e.to_string()));
            db.migrate().await.unwrap_or_else(|e| fatal(&e.to_string()));

            let dispatcher: Arc<dyn TaskDispatcher> = match &config.dispatch {
                Some(settings) => Arc::new(HttpTaskDispatcher::new(
                    DispatchRouting {
                        project_id: settings.project_id.clone(),
                        location: settings.location.clone(),
                        queue: settings.queue.clone(),
                        callback_base: settings.callback_base.clone(),
                    },
                    config.tasks_token.clone(),
                )),
                None => {
                    info!("No scheduler routing configured; reminders rely on the sweep");
                    Arc::new(NoopDispatcher)
                }
            };

            let service = Arc::new(ReminderService::new(
                db.clone(),
                llm.clone(),
                transport.clone(),
                dispatcher,
                config.reminder_confidence_threshold,
            ));
            (
                Arc::new(SqliteConversationStore::new(
                    db.pool().clone(),
                    config.history_ttl_hours,
                )),
                Some(service),
            )
        };

    let orchestrator = Arc::new(Orchestrator::new(
        store,
        llm,
        summarizer,
        transport,
        reminders.clone(),
        OrchestratorConfig {
            admin_id: config.admin_id,
            bot_username,
            history_max_messages: config.history_max_messages,
            summary_trigger: config.summary_trigger,
            history_ttl_hours: config.history_ttl_hours,
        },
    ));

    if let Some(base) = &config.webhook_base {
        let url = format!("{}{}", base.trim_end_matches('/'), config.webhook_path);
        match bot.set_webhook(&url, config.webhook_secret.as_deref()).await {
            Ok(()) => info!("Webhook registered at {}", url),
            Err(e) => warn!("Webhook registration failed: {}", e),
        }
    }

    let state = AppState {
        orchestrator,
        reminders,
        webhook_secret: config.webhook_secret.clone(),
        tasks_token: config.tasks_token.clone(),
    };
    let app = routes::router(state, &config.webhook_path);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|e| fatal(&e.to_string()));
    info!("Listening on {}", config.bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        fatal(&e.to_string());
    }
}
