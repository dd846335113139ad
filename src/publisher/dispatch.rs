use std::sync::Arc;

use tokio::{
    sync::mpsc::{self, error::TrySendError},
    time::{Duration, sleep},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    models::{message::NotificationMessage, publisher::PublisherConfig},
    publisher::{retry_table::RetryTable, supervisor::ConnectionSupervisor},
};

#[derive(Debug, Clone)]
pub struct InlineRetry {
    pub attempts: u32,
    /// Upper bound on each wait for reconnection, and the pause after a
    /// failed attempt.
    pub pause: Duration,
    pub publish_timeout: Duration,
}

impl InlineRetry {
    pub fn from_config(config: &PublisherConfig) -> Self {
        Self {
            attempts: config.inline_attempts,
            pause: config.inline_retry_pause,
            publish_timeout: config.publish_timeout,
        }
    }
}

/// Producer side of the bounded dispatch queue.
pub struct DispatchQueue {
    sender: mpsc::Sender<NotificationMessage>,
    supervisor: Arc<ConnectionSupervisor>,
    publish_timeout: Duration,
}

/// The single consumer draining the dispatch queue.
pub struct DispatchWorker {
    receiver: mpsc::Receiver<NotificationMessage>,
    supervisor: Arc<ConnectionSupervisor>,
    retry_table: Arc<RetryTable>,
    retry: InlineRetry,
}

impl DispatchQueue {
    pub fn new(
        supervisor: Arc<ConnectionSupervisor>,
        retry_table: Arc<RetryTable>,
        config: &PublisherConfig,
    ) -> (Self, DispatchWorker) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);

        let queue = Self {
            sender,
            supervisor: supervisor.clone(),
            publish_timeout: config.publish_timeout,
        };

        let worker = DispatchWorker {
            receiver,
            supervisor,
            retry_table,
            retry: InlineRetry::from_config(config),
        };

        (queue, worker)
    }

    /// Enqueues without blocking. When the queue is full the message is
    /// published directly instead, so the caller never waits on the worker.
    pub async fn enqueue_or_send(&self, message: NotificationMessage) -> Result<()> {
        match self.sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                warn!(message_id = %message.id, "Dispatch queue is full, publishing directly");

                let payload = message.to_payload()?;
                self.supervisor.publish(&payload, self.publish_timeout).await
            }
            Err(TrySendError::Closed(message)) => Err(Error::publish(format!(
                "dispatch queue is closed, message {} was not accepted",
                message.id
            ))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

impl DispatchWorker {
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = self.receiver.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            if let Err(e) =
                publish_with_retry(&self.supervisor, &message, &self.retry, &shutdown).await
            {
                warn!(
                    message_id = %message.id,
                    error = %e,
                    "Failed to publish message after retries, queuing for later retry"
                );
                self.retry_table.insert(message);
            }
        }

        let abandoned = self.receiver.len();
        if abandoned > 0 {
            warn!(abandoned, "Dispatch worker stopped with messages still queued");
        }

        debug!("Dispatch worker stopped");
    }
}

/// Up to `retry.attempts` publishes. While the link is down each attempt
/// first waits (bounded) for the supervisor to reconnect.
pub async fn publish_with_retry(
    supervisor: &ConnectionSupervisor,
    message: &NotificationMessage,
    retry: &InlineRetry,
    shutdown: &CancellationToken,
) -> Result<()> {
    let payload = message.to_payload()?;
    let mut last_error = Error::publish("no publish attempt was made");

    for attempt in 1..=retry.attempts {
        if !supervisor.is_connected() {
            debug!(message_id = %message.id, attempt, "Broker disconnected, waiting for reconnection");

            let reconnected = tokio::select! {
                _ = shutdown.cancelled() => return Err(Error::publish("shutdown requested")),
                connected = supervisor.wait_connected(retry.pause) => connected,
            };

            if !reconnected {
                last_error = Error::publish("not connected to message broker");
                continue;
            }
        }

        match supervisor.publish(&payload, retry.publish_timeout).await {
            Ok(()) => {
                if attempt > 1 {
                    info!(message_id = %message.id, attempt, "Publish succeeded on retry");
                }
                return Ok(());
            }
            Err(e) => {
                debug!(message_id = %message.id, attempt, error = %e, "Publish attempt failed");
                last_error = e;

                if attempt < retry.attempts {
                    tokio::select! {
                        _ = shutdown.cancelled() => return Err(Error::publish("shutdown requested")),
                        _ = sleep(retry.pause) => {}
                    }
                }
            }
        }
    }

    Err(Error::publish(format!(
        "failed after {} attempts: {}",
        retry.attempts, last_error
    )))
}
