use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub reconnect_delay: Duration,
    pub queue_capacity: usize,
    pub inline_attempts: u32,
    pub inline_retry_pause: Duration,
    pub publish_timeout: Duration,
    pub sweep_interval: Duration,
    pub max_retry_entries: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            queue_capacity: 100,
            inline_attempts: 3,
            inline_retry_pause: Duration::from_secs(1),
            publish_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(5),
            max_retry_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub max_retries: u32,
    pub batch_size: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(300),
            max_retries: 5,
            batch_size: 100,
        }
    }
}
