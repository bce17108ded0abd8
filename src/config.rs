use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub channels: ChannelConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[serde(default)]
    pub decider: DeciderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Inbound topic carrying placement events
    #[serde(default = "default_placed_topic")]
    pub order_placed_topic: String,
    /// Outbound topic for execution events
    #[serde(default = "default_executed_topic")]
    pub order_executed_topic: String,
    /// Per-topic queue capacity of the in-process broker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_placed_topic() -> String {
    "order.placed.event".to_string()
}

fn default_executed_topic() -> String {
    "order.executed.event".to_string()
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            order_placed_topic: default_placed_topic(),
            order_executed_topic: default_executed_topic(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    /// How long a poll waits for a delivery before checking the stop flag
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Pause before a failed delivery is returned for redelivery
    #[serde(default = "default_redelivery_delay")]
    pub redelivery_delay_ms: u64,
}

fn default_poll_interval() -> u64 {
    250
}

fn default_redelivery_delay() -> u64 {
    500
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            redelivery_delay_ms: default_redelivery_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    /// Interval between relay drain cycles
    #[serde(default = "default_drain_interval")]
    pub drain_interval_ms: u64,
    /// Maximum outbox rows published per cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

fn default_drain_interval() -> u64 {
    500
}

fn default_batch_size() -> i64 {
    32
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: default_drain_interval(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DeciderConfig {
    /// Reject orders whose notional exceeds this limit. None accepts all.
    #[serde(default)]
    pub max_notional_usd: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("ORDEX_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (ORDEX_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("ORDEX")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database.url.is_empty() {
            errors.push("database.url must not be empty".to_string());
        }

        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be at least 1".to_string());
        }

        if self.channels.order_placed_topic.is_empty() {
            errors.push("channels.order_placed_topic must not be empty".to_string());
        }

        if self.channels.order_executed_topic.is_empty() {
            errors.push("channels.order_executed_topic must not be empty".to_string());
        }

        if self.channels.order_placed_topic == self.channels.order_executed_topic {
            errors.push("inbound and outbound topics must differ".to_string());
        }

        if self.channels.queue_capacity == 0 {
            errors.push("channels.queue_capacity must be at least 1".to_string());
        }

        if self.outbox.batch_size <= 0 {
            errors.push("outbox.batch_size must be positive".to_string());
        }

        if self.outbox.drain_interval_ms == 0 {
            errors.push("outbox.drain_interval_ms must be positive".to_string());
        }

        if let Some(limit) = self.decider.max_notional_usd {
            if limit <= Decimal::ZERO {
                errors.push("decider.max_notional_usd must be positive when set".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
