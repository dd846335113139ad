use anyhow::{Error, Result, anyhow, ensure};
use dotenvy::dotenv;
use serde::Deserialize;
use tokio::time::Duration;

use crate::models::publisher::{PublisherConfig, ReconcileConfig};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    #[serde(default = "default_exchange")]
    pub rabbitmq_exchange: String,
    #[serde(default = "default_routing_key")]
    pub rabbitmq_routing_key: String,

    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_reconnect_delay_seconds")]
    pub reconnect_delay_seconds: u64,
    #[serde(default = "default_dispatch_queue_capacity")]
    pub dispatch_queue_capacity: usize,
    #[serde(default = "default_inline_publish_attempts")]
    pub inline_publish_attempts: u32,
    #[serde(default = "default_inline_retry_pause_ms")]
    pub inline_retry_pause_ms: u64,
    #[serde(default = "default_publish_timeout_seconds")]
    pub publish_timeout_seconds: u64,
    #[serde(default = "default_retry_sweep_interval_seconds")]
    pub retry_sweep_interval_seconds: u64,
    #[serde(default = "default_max_retry_entries")]
    pub max_retry_entries: usize,

    #[serde(default = "default_reconcile_enabled")]
    pub reconcile_enabled: bool,
    #[serde(default = "default_reconcile_interval_seconds")]
    pub reconcile_interval_seconds: u64,
    #[serde(default = "default_reconcile_max_retries")]
    pub reconcile_max_retries: u32,
    #[serde(default = "default_reconcile_batch_size")]
    pub reconcile_batch_size: usize,

    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

fn default_exchange() -> String {
    "notifications".to_string()
}

fn default_routing_key() -> String {
    "user.notification".to_string()
}

fn default_reconnect_delay_seconds() -> u64 {
    5
}

fn default_dispatch_queue_capacity() -> usize {
    100
}

fn default_inline_publish_attempts() -> u32 {
    3
}

fn default_inline_retry_pause_ms() -> u64 {
    1000
}

fn default_publish_timeout_seconds() -> u64 {
    5
}

fn default_retry_sweep_interval_seconds() -> u64 {
    5
}

fn default_max_retry_entries() -> usize {
    10_000
}

fn default_reconcile_enabled() -> bool {
    true
}

fn default_reconcile_interval_seconds() -> u64 {
    300
}

fn default_reconcile_max_retries() -> u32 {
    5
}

fn default_reconcile_batch_size() -> usize {
    100
}

fn default_shutdown_grace_seconds() -> u64 {
    30
}

fn default_server_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environment variable: {}", e))?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        ensure!(!self.rabbitmq_url.is_empty(), "RABBITMQ_URL must not be empty");
        ensure!(!self.rabbitmq_exchange.is_empty(), "RABBITMQ_EXCHANGE must not be empty");
        ensure!(
            self.dispatch_queue_capacity > 0,
            "DISPATCH_QUEUE_CAPACITY must be greater than zero"
        );
        ensure!(
            self.inline_publish_attempts > 0,
            "INLINE_PUBLISH_ATTEMPTS must be greater than zero"
        );
        ensure!(
            self.reconcile_batch_size > 0,
            "RECONCILE_BATCH_SIZE must be greater than zero"
        );
        ensure!(
            self.reconnect_delay_seconds > 0,
            "RECONNECT_DELAY_SECONDS must be greater than zero"
        );

        Ok(())
    }

    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref().filter(|url| !url.is_empty())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            reconnect_delay: Duration::from_secs(self.reconnect_delay_seconds),
            queue_capacity: self.dispatch_queue_capacity,
            inline_attempts: self.inline_publish_attempts,
            inline_retry_pause: Duration::from_millis(self.inline_retry_pause_ms),
            publish_timeout: Duration::from_secs(self.publish_timeout_seconds),
            sweep_interval: Duration::from_secs(self.retry_sweep_interval_seconds),
            max_retry_entries: self.max_retry_entries,
        }
    }

    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            enabled: self.reconcile_enabled,
            interval: Duration::from_secs(self.reconcile_interval_seconds),
            max_retries: self.reconcile_max_retries,
            batch_size: self.reconcile_batch_size,
        }
    }
}
