//! Environment configuration for the gateway.
//!
//! Loaded once at startup; any missing or malformed required setting is
//! fatal and the process does not start. The LLM client reads its own
//! `OPENAI_*` variables separately (and is equally fatal on a missing key).

use std::env;

use thiserror::Error;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent or empty.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable holds a value that does not parse.
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Routing settings for the external task scheduler.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub project_id: String,
    pub location: String,
    pub queue: String,
    /// Public base URL the scheduler calls back into.
    pub callback_base: String,
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Telegram bot token.
    pub bot_token: String,
    /// The only user the bot answers.
    pub admin_id: i64,
    /// SQLx database URL.
    pub database_url: String,
    /// Run on the in-memory store instead (disables reminders).
    pub database_disabled: bool,
    /// Public base URL for the Telegram webhook, if any.
    pub webhook_base: Option<String>,
    /// Webhook path.
    pub webhook_path: String,
    /// Shared secret Telegram echoes back on webhook requests.
    pub webhook_secret: Option<String>,
    /// Raw-turn budget for history reads and post-compaction tails.
    pub history_max_messages: usize,
    /// Stored-turn count that triggers compaction.
    pub summary_trigger: usize,
    /// TTL for stored turns and summaries.
    pub history_ttl_hours: i64,
    /// Extraction confidence below which the dialogue re-asks for a time.
    pub reminder_confidence_threshold: f64,
    /// Shared secret for the `/tasks/*` endpoints.
    pub tasks_token: Option<String>,
    /// Scheduler routing; `None` means sweep-only delivery.
    pub dispatch: Option<DispatchSettings>,
    /// HTTP bind address.
    pub bind_addr: String,
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
        }),
    }
}

fn flag(name: &'static str) -> bool {
    matches!(
        optional(name).map(|v| v.to_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

impl GatewayConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = required("BOT_TOKEN")?;
        let admin_id_raw = required("ADMIN_ID")?;
        let admin_id = admin_id_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "ADMIN_ID",
            value: admin_id_raw,
        })?;

        let database_disabled = flag("DATABASE_DISABLED");
        let database_url =
            optional("DATABASE_URL").unwrap_or_else(|| "sqlite:sova.db?mode=rwc".to_string());

        let webhook_base = optional("WEBHOOK_BASE");
        let webhook_path = optional("WEBHOOK_PATH").unwrap_or_else(|| "/webhook".to_string());
        let webhook_secret = optional("WEBHOOK_SECRET");

        let history_max_messages = parse_or("HISTORY_MAX_MESSAGES", 16)?;
        let summary_trigger = parse_or("SUMMARY_TRIGGER", 20)?;
        let history_ttl_hours = parse_or("HISTORY_TTL_HOURS", 168)?;
        let reminder_confidence_threshold = parse_or("REMINDER_CONFIDENCE_THRESHOLD", 0.7)?;

        let tasks_token = optional("TASKS_TOKEN");

        // The dispatcher needs the full routing triple plus a callback
        // base; anything less means sweep-only delivery.
        let callback_base = optional("TASKS_BASE").or_else(|| webhook_base.clone());
        let dispatch = match (
            optional("TASKS_PROJECT_ID"),
            optional("TASKS_LOCATION"),
            optional("TASKS_QUEUE"),
            callback_base,
        ) {
            (Some(project_id), Some(location), Some(queue), Some(callback_base)) => {
                Some(DispatchSettings {
                    project_id,
                    location,
                    queue,
                    callback_base,
                })
            }
            _ => None,
        };

        let bind_addr = optional("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        Ok(Self {
            bot_token,
            admin_id,
            database_url,
            database_disabled,
            webhook_base,
            webhook_path,
            webhook_secret,
            history_max_messages,
            summary_trigger,
            history_ttl_hours,
            reminder_confidence_threshold,
            tasks_token,
            dispatch,
            bind_addr,
        })
    }
}
