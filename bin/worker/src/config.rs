//! Centralized worker configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested sections, e.g. `NATS__URL` or
//! `SCHEDULER__POLL_INTERVAL_SECS`.

use encore_flow::nats::NatsConfig;
use encore_flow::{DispatchConfig, EngineConfig};
use encore_integration::{EmailConfig, MailchimpConfig};
use encore_scheduler::SchedulerConfig;
use serde::Deserialize;

/// Worker configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct WorkerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Maximum pooled database connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Trigger bus connection.
    pub nats: NatsConfig,

    #[serde(default)]
    pub intake: IntakeConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Click tracking for links in flow email.
    pub tracking: DispatchConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub mailchimp: MailchimpConfig,
}

/// Trigger intake settings.
#[derive(Debug, Clone, Deserialize)]
pub struct IntakeConfig {
    /// Trigger events handled concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Delay before an event that failed to process is redelivered.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_concurrency() -> usize {
    8
}

fn default_retry_delay_secs() -> u64 {
    30
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl WorkerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(
            config::Environment::default()
                .separator("__")
                .try_parsing(true),
        )
    }

    fn from_source(
        source: impl config::Source + Send + Sync + 'static,
    ) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}
