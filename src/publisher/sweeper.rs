use std::sync::Arc;

use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::publisher::{retry_table::RetryTable, supervisor::ConnectionSupervisor};

/// Periodically re-publishes retry table entries while the link is up.
/// Entries are visited in no particular order.
pub struct RetrySweeper {
    supervisor: Arc<ConnectionSupervisor>,
    retry_table: Arc<RetryTable>,
    interval: Duration,
    publish_timeout: Duration,
}

impl RetrySweeper {
    pub fn new(
        supervisor: Arc<ConnectionSupervisor>,
        retry_table: Arc<RetryTable>,
        interval: Duration,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            supervisor,
            retry_table,
            interval,
            publish_timeout,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }

        debug!("Retry sweeper stopped");
    }

    /// One pass over the table. Returns how many entries were published and
    /// removed.
    pub async fn sweep(&self) -> usize {
        if self.retry_table.is_empty() {
            return 0;
        }

        info!(pending = self.retry_table.len(), "Processing messages in retry table");

        let mut published = 0;

        for message in self.retry_table.snapshot() {
            if !self.supervisor.is_connected() {
                debug!("Broker disconnected, deferring rest of retry sweep");
                break;
            }

            let payload = match message.to_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "Dropping unserializable retry entry");
                    self.retry_table.remove(&message.id);
                    continue;
                }
            };

            match self.supervisor.publish(&payload, self.publish_timeout).await {
                Ok(()) => {
                    self.retry_table.remove(&message.id);
                    published += 1;
                }
                Err(e) => {
                    debug!(message_id = %message.id, error = %e, "Retry publish failed, keeping entry");
                }
            }
        }

        if published > 0 {
            info!(
                published,
                remaining = self.retry_table.len(),
                "Retry sweep republished messages"
            );
        }

        published
    }
}
