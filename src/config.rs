use serde::Deserialize;
use std::env;

use crate::utils::{CircuitBreakerConfig, RetryConfig};

// ============================================================================
// Application Configuration
// ============================================================================
//
// Layered sources, later ones win:
//   config/default.toml
//   config/{RUN_MODE}.toml      (optional, RUN_MODE defaults to "development")
//   config/local.toml           (optional, not checked in)
//   PRINTSHOP__SECTION__KEY     environment variables
//
// Every field has a default so an empty source still yields a usable
// local setup (SQLite file, in-process broadcast, no printer key).
//
// ============================================================================

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub printer: PrinterConfig,
    pub broadcast: BroadcastConfig,
    pub relay: RelayConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL, e.g. `sqlite://printshop.db` or `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://printshop.db".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 3,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PrinterConfig {
    /// OctoPrint base URL
    pub base_url: String,
    pub api_key: String,
    /// The one file every approved order prints
    pub job_file: String,
    pub request_timeout_secs: u64,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            base_url: "http://octopi.local/".to_string(),
            api_key: String::new(),
            job_file: "red.gcode".to_string(),
            request_timeout_secs: 10,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastBackend {
    /// In-process tokio broadcast bus
    Local,
    /// Redis PUBLISH
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BroadcastConfig {
    pub backend: BroadcastBackend,
    pub redis_url: String,
    /// Prepended to the group name to form the Redis channel
    pub channel_prefix: String,
    pub group: String,
    /// Per-group buffer of the local bus
    pub local_capacity: usize,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            backend: BroadcastBackend::Local,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            channel_prefix: String::new(),
            group: "orders".to_string(),
            local_capacity: 256,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostCommit {
    /// Drain the outbox right after the write commits
    Immediate,
    /// Leave it to the relay actor's next tick
    Deferred,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RelayConfig {
    pub post_commit: PostCommit,
    pub poll_interval_ms: u64,
    pub batch_size: u32,
    /// Failed passes before a message is dead-lettered
    pub max_delivery_attempts: u32,
    pub retry: RetryConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            post_commit: PostCommit::Immediate,
            poll_interval_ms: 2000,
            batch_size: 50,
            max_delivery_attempts: 5,
            retry: RetryConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Zero batch size, delivery attempts or poll interval leave the relay
    /// spinning or dead-lettering on the first failure.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let limits = [
            ("relay.batch_size", u64::from(self.batch_size)),
            ("relay.max_delivery_attempts", u64::from(self.max_delivery_attempts)),
            ("relay.poll_interval_ms", self.poll_interval_ms),
        ];

        for (key, value) in limits {
            if value == 0 {
                return Err(config::ConfigError::Message(format!("{key} must be at least 1")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9090,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // PRINTSHOP__PRINTER__API_KEY=... sets printer.api_key
            .add_source(config::Environment::with_prefix("PRINTSHOP").separator("__"))
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    pub fn from_toml_str(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    fn validated(self) -> Result<Self, config::ConfigError> {
        self.relay.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_source_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();

        assert_eq!(config.printer.job_file, "red.gcode");
        assert_eq!(config.broadcast.group, "orders");
        assert_eq!(config.broadcast.backend, BroadcastBackend::Local);
        assert_eq!(config.relay.post_commit, PostCommit::Immediate);
        assert_eq!(config.relay.retry.max_attempts, 3);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            [database]
            url = "sqlite::memory:"

            [printer]
            base_url = "http://printer.lan:5000/"
            api_key = "secret"
            job_file = "blue.gcode"

            [printer.circuit_breaker]
            failure_threshold = 2
            open_timeout_secs = 5

            [broadcast]
            backend = "redis"
            channel_prefix = "asgi:"

            [relay]
            post_commit = "deferred"
            max_delivery_attempts = 7

            [relay.retry]
            initial_delay_ms = 20
            "#,
        )
        .unwrap();

        assert!(config.database.is_in_memory());
        assert_eq!(config.printer.api_key, "secret");
        assert_eq!(config.printer.job_file, "blue.gcode");
        assert_eq!(config.printer.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.printer.circuit_breaker.open_timeout, Duration::from_secs(5));
        assert_eq!(config.broadcast.backend, BroadcastBackend::Redis);
        assert_eq!(config.broadcast.channel_prefix, "asgi:");
        assert_eq!(config.broadcast.group, "orders");
        assert_eq!(config.relay.post_commit, PostCommit::Deferred);
        assert_eq!(config.relay.max_delivery_attempts, 7);
        assert_eq!(config.relay.retry.initial_delay, Duration::from_millis(20));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result = Config::from_toml_str(
            r#"
            [broadcast]
            backend = "kafka"
            "#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn test_zero_relay_limits_are_rejected() {
        for source in [
            "[relay]\nbatch_size = 0",
            "[relay]\nmax_delivery_attempts = 0",
            "[relay]\npoll_interval_ms = 0",
        ] {
            let err = Config::from_toml_str(source).unwrap_err();
            assert!(err.to_string().contains("must be at least 1"), "{source}: {err}");
        }

        assert!(Config::from_toml_str("[relay]\nbatch_size = 1").is_ok());
    }
}
