//! Runtime configuration loaded from environment variables.
//!
//! Every knob has a default; unparseable values log a warning and fall back
//! to the default.

use std::time::Duration;

use tracing::warn;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_STROKE_FLUSH_MS: u64 = 5000;
const DEFAULT_NOTES_DEBOUNCE_MS: u64 = 500;
const DEFAULT_NAME_DEBOUNCE_MS: u64 = 500;
const DEFAULT_CHAT_HISTORY_LIMIT: usize = 100;
const DEFAULT_CLIENT_CHANNEL_CAPACITY: usize = 256;

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    parse_or_default(key, std::env::var(key).ok().as_deref(), default)
}

fn parse_or_default<T>(key: &str, raw: Option<&str>, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!(key, value = raw, "invalid config value; using default");
            default
        }
    }
}

/// Batching and debounce windows for durable writes.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    /// Delay between the first pending stroke on a board and its flush.
    pub stroke_flush: Duration,
    /// Quiet period after the last notes edit before it is persisted.
    pub notes_debounce: Duration,
    /// Quiet period after the last board-name edit before it is persisted.
    pub name_debounce: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            stroke_flush: Duration::from_millis(DEFAULT_STROKE_FLUSH_MS),
            notes_debounce: Duration::from_millis(DEFAULT_NOTES_DEBOUNCE_MS),
            name_debounce: Duration::from_millis(DEFAULT_NAME_DEBOUNCE_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Exact origin allowed by CORS (with credentials). Any origin when unset.
    pub cors_origin: Option<String>,
    pub batch: BatchConfig,
    /// Number of chat messages replayed in `board-state`.
    pub chat_history_limit: usize,
    /// Per-session outbound queue depth. Broadcasts to a full queue are dropped.
    pub client_channel_capacity: usize,
    /// Session token seeded into the in-memory store for local development.
    pub dev_session_token: Option<String>,
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            database_url: non_empty_var("DATABASE_URL"),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            cors_origin: non_empty_var("CORS_ORIGIN"),
            batch: BatchConfig {
                stroke_flush: Duration::from_millis(env_parse("STROKE_FLUSH_MS", DEFAULT_STROKE_FLUSH_MS)),
                notes_debounce: Duration::from_millis(env_parse("NOTES_DEBOUNCE_MS", DEFAULT_NOTES_DEBOUNCE_MS)),
                name_debounce: Duration::from_millis(env_parse("NAME_DEBOUNCE_MS", DEFAULT_NAME_DEBOUNCE_MS)),
            },
            chat_history_limit: env_parse("CHAT_HISTORY_LIMIT", DEFAULT_CHAT_HISTORY_LIMIT),
            client_channel_capacity: env_parse("CLIENT_CHANNEL_CAPACITY", DEFAULT_CLIENT_CHANNEL_CAPACITY).max(1),
            dev_session_token: non_empty_var("DEV_SESSION_TOKEN"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            cors_origin: None,
            batch: BatchConfig::default(),
            chat_history_limit: DEFAULT_CHAT_HISTORY_LIMIT,
            client_channel_capacity: DEFAULT_CLIENT_CHANNEL_CAPACITY,
            dev_session_token: None,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
