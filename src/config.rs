//! Server configuration parsed from environment variables.
//!
//! Every knob has a default so a bare `cargo run` starts an in-memory hub
//! on port 4000.

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ADMIN_NEWS_TOKEN: &str = "changeme";
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_PERSIST_QUEUE_CAPACITY: usize = 8192;
pub const DEFAULT_MAX_NAME_LEN: usize = 32;
pub const DEFAULT_MAX_TEXT_LEN: usize = 2000;
pub const DEFAULT_MAX_NEWS_LEN: usize = 4000;

/// Length limits applied to inbound names and message bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_name_len: usize,
    pub max_text_len: usize,
    pub max_news_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_name_len: DEFAULT_MAX_NAME_LEN,
            max_text_len: DEFAULT_MAX_TEXT_LEN,
            max_news_len: DEFAULT_MAX_NEWS_LEN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    /// Postgres URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub admin_news_token: String,
    /// Directory of static UI assets served at `/`.
    pub static_dir: Option<PathBuf>,
    /// Bounded outbound queue per connection.
    pub client_queue_capacity: usize,
    /// Bounded queue in front of the history writer.
    pub persist_queue_capacity: usize,
    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            admin_news_token: DEFAULT_ADMIN_NEWS_TOKEN.to_string(),
            static_dir: None,
            client_queue_capacity: DEFAULT_CLIENT_QUEUE_CAPACITY,
            persist_queue_capacity: DEFAULT_PERSIST_QUEUE_CAPACITY,
            limits: Limits::default(),
        }
    }
}

impl Config {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `PORT`: default 4000
    /// - `DATABASE_URL`: Postgres store when set
    /// - `DB_MAX_CONNECTIONS`: default 5
    /// - `ADMIN_NEWS_TOKEN`: default `changeme`
    /// - `STATIC_DIR`: static UI root
    /// - `CLIENT_QUEUE_CAPACITY`: default 256
    /// - `PERSIST_QUEUE_CAPACITY`: default 8192
    /// - `MAX_NAME_LEN` / `MAX_TEXT_LEN` / `MAX_NEWS_LEN`: 32 / 2000 / 4000
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Used by tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            port: env_parse(&parse, "PORT", DEFAULT_PORT),
            database_url: parse("DATABASE_URL"),
            db_max_connections: env_parse(&parse, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            admin_news_token: parse("ADMIN_NEWS_TOKEN").unwrap_or_else(|| DEFAULT_ADMIN_NEWS_TOKEN.to_string()),
            static_dir: parse("STATIC_DIR").map(PathBuf::from),
            client_queue_capacity: env_parse(&parse, "CLIENT_QUEUE_CAPACITY", DEFAULT_CLIENT_QUEUE_CAPACITY).max(1),
            persist_queue_capacity: env_parse(&parse, "PERSIST_QUEUE_CAPACITY", DEFAULT_PERSIST_QUEUE_CAPACITY).max(1),
            limits: Limits {
                max_name_len: env_parse(&parse, "MAX_NAME_LEN", DEFAULT_MAX_NAME_LEN).max(1),
                max_text_len: env_parse(&parse, "MAX_TEXT_LEN", DEFAULT_MAX_TEXT_LEN).max(1),
                max_news_len: env_parse(&parse, "MAX_NEWS_LEN", DEFAULT_MAX_NEWS_LEN).max(1),
            },
        }
    }
}

fn env_parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
