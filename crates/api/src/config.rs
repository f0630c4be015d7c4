//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use saga::{OutboxRelayConfig, SagaConfig};

/// Log output format for the `fmt` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `0.0.0.0`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `pretty` or `json` (default `pretty`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs in memory
/// - `OUTBOX_POLL_INTERVAL_MS` (default `5000`)
/// - `OUTBOX_BATCH_SIZE` (default `100`)
/// - `OUTBOX_MAX_RETRIES` (default `5`)
/// - `SAGA_PENDING_TIMEOUT_SECS` (default `60`)
/// - `SAGA_SWEEP_INTERVAL_MS` (default `10000`)
///
/// Values that fail to parse are logged and replaced by the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: usize,
    pub outbox_max_retries: u32,
    pub pending_timeout_secs: i64,
    pub sweep_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse_or(&lookup, "LOG_FORMAT", defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            outbox_poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "OUTBOX_POLL_INTERVAL_MS",
                5_000,
            )),
            outbox_batch_size: parse_or(&lookup, "OUTBOX_BATCH_SIZE", defaults.outbox_batch_size),
            outbox_max_retries: parse_or(
                &lookup,
                "OUTBOX_MAX_RETRIES",
                defaults.outbox_max_retries,
            ),
            pending_timeout_secs: parse_or(
                &lookup,
                "SAGA_PENDING_TIMEOUT_SECS",
                defaults.pending_timeout_secs,
            ),
            sweep_interval: Duration::from_millis(parse_or(
                &lookup,
                "SAGA_SWEEP_INTERVAL_MS",
                10_000,
            )),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn saga_config(&self) -> SagaConfig {
        SagaConfig {
            pending_timeout: chrono::Duration::seconds(self.pending_timeout_secs),
            ..SagaConfig::default()
        }
    }

    pub fn relay_config(&self) -> OutboxRelayConfig {
        OutboxRelayConfig {
            batch_size: self.outbox_batch_size,
            max_retries: self.outbox_max_retries,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let relay = OutboxRelayConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            outbox_poll_interval: Duration::from_millis(5_000),
            outbox_batch_size: relay.batch_size,
            outbox_max_retries: relay.max_retries,
            pending_timeout_secs: SagaConfig::default().pending_timeout.num_seconds(),
            sweep_interval: Duration::from_millis(10_000),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|err| {
            tracing::warn!(key, value = %raw, error = %err, "invalid configuration value, using default");
            default
        }),
    }
}
