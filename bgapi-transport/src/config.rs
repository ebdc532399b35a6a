//! Configuration for the serial handler.
//!
//! Each field comes from, in order of precedence:
//! 1. A `[handler]` section deserialized by the embedding application
//! 2. Environment variables (BGAPI_*)
//! 3. Default values
//!
//! Deserialization starts from `load_from_env`, so a section that sets only
//! some fields keeps the environment's values for the rest.

use std::time::Duration;

use log::debug;
use serde::{Deserialize, Deserializer};

/// Handler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default = "HandlerConfig::load_from_env")]
pub struct HandlerConfig {
    /// Per-transaction timeout. `None` waits until the link closes.
    #[serde(rename = "transaction_timeout_ms", deserialize_with = "optional_millis")]
    pub transaction_timeout: Option<Duration>,
    /// Consecutive read failures tolerated before the link is declared dead.
    pub max_read_errors: u32,
    /// Worker threads for transaction waits and event dispatch.
    pub worker_threads: usize,
    /// How long `close` waits for the reader thread to exit.
    #[serde(rename = "close_timeout_ms", deserialize_with = "millis")]
    pub close_timeout: Duration,
    /// Drain stale input before starting the reader.
    ///
    /// Only safe on streams with a read timeout.
    pub flush_on_connect: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: Some(Duration::from_secs(10)),
            max_read_errors: 3,
            worker_threads: 2,
            close_timeout: Duration::from_secs(1),
            flush_on_connect: false,
        }
    }
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

fn optional_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    u64::deserialize(deserializer).map(|ms| (ms > 0).then(|| Duration::from_millis(ms)))
}

fn parse_flag(s: &str) -> bool {
    let lower = s.to_lowercase();
    lower == "1" || lower == "true" || lower == "yes" || lower == "on"
}

impl HandlerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn load_from_env() -> Self {
        Self::load_with(|key| std::env::var(key).ok())
    }

    fn load_with<F: Fn(&str) -> Option<String>>(var: F) -> Self {
        let defaults = Self::default();

        let transaction_timeout = var("BGAPI_TRANSACTION_TIMEOUT")
            .and_then(|s| s.parse::<u64>().ok())
            .map(|ms| (ms > 0).then(|| Duration::from_millis(ms)))
            .unwrap_or(defaults.transaction_timeout);

        let max_read_errors = var("BGAPI_MAX_READ_ERRORS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_read_errors);

        let worker_threads = var("BGAPI_WORKER_THREADS")
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.worker_threads);

        let close_timeout = var("BGAPI_CLOSE_TIMEOUT")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.close_timeout);

        let flush_on_connect = var("BGAPI_FLUSH_ON_CONNECT")
            .map(|s| parse_flag(&s))
            .unwrap_or(defaults.flush_on_connect);

        let config = Self {
            transaction_timeout,
            max_read_errors,
            worker_threads,
            close_timeout,
            flush_on_connect,
        };
        debug!("Using environment/default handler config: {:?}", config);
        config
    }
}
