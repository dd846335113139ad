//! Reliable publish pipeline.
//!
//! A [`Publisher`] owns the connection supervisor, the dispatch worker and
//! the retry sweeper as supervised tasks that stop together on
//! [`Publisher::shutdown`].

pub mod dispatch;
pub mod retry_table;
pub mod supervisor;
pub mod sweeper;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::{sync::Mutex, task::JoinHandle, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    clients::broker::BrokerTransport,
    error::Result,
    models::{message::NotificationMessage, publisher::PublisherConfig, status::ConnectionState},
};

use self::{
    dispatch::DispatchQueue, retry_table::RetryTable, supervisor::ConnectionSupervisor,
    sweeper::RetrySweeper,
};

/// The publish pathway consumed by the notification service.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Hands the message to the dispatch pipeline. `Ok` means accepted for
    /// delivery, not delivered.
    async fn publish(&self, message: &NotificationMessage) -> Result<()>;

    /// One direct publish whose outcome is known when this returns.
    async fn publish_now(&self, message: &NotificationMessage) -> Result<()>;

    fn is_connected(&self) -> bool;
}

pub struct Publisher {
    supervisor: Arc<ConnectionSupervisor>,
    queue: DispatchQueue,
    retry_table: Arc<RetryTable>,
    publish_timeout: Duration,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Publisher {
    /// Makes one connection attempt, then starts the background tasks.
    /// A failed first attempt is retried by the supervisor.
    pub async fn start(transport: Arc<dyn BrokerTransport>, config: PublisherConfig) -> Self {
        let supervisor = Arc::new(ConnectionSupervisor::new(transport, config.reconnect_delay));

        if let Err(e) = supervisor.connect().await {
            warn!(error = %e, "Failed to connect to message broker initially, retrying in the background");
        }

        let retry_table = Arc::new(RetryTable::new(config.max_retry_entries));
        let shutdown = CancellationToken::new();

        let (queue, worker) = DispatchQueue::new(supervisor.clone(), retry_table.clone(), &config);
        let sweeper = RetrySweeper::new(
            supervisor.clone(),
            retry_table.clone(),
            config.sweep_interval,
            config.publish_timeout,
        );

        let tasks = vec![
            (
                "connection_supervisor",
                tokio::spawn(supervisor.clone().run(shutdown.clone())),
            ),
            ("dispatch_worker", tokio::spawn(worker.run(shutdown.clone()))),
            ("retry_sweeper", tokio::spawn(sweeper.run(shutdown.clone()))),
        ];

        info!(
            queue_capacity = config.queue_capacity,
            inline_attempts = config.inline_attempts,
            "Publisher started"
        );

        Self {
            supervisor,
            queue,
            retry_table,
            publish_timeout: config.publish_timeout,
            shutdown,
            tasks: Mutex::new(tasks),
        }
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    pub fn retry_table(&self) -> &Arc<RetryTable> {
        &self.retry_table
    }

    pub fn retry_backlog(&self) -> usize {
        self.retry_table.len()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.supervisor.state().await
    }

    /// Stops all background tasks, waiting at most `grace` for them, then
    /// closes the broker link. Retry table entries are dropped.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        let aborts: Vec<_> = tasks.iter().map(|(_, handle)| handle.abort_handle()).collect();

        let joined = join_all(tasks.into_iter().map(|(name, handle)| async move {
            if let Err(e) = handle.await {
                error!(task = name, error = %e, "Publisher task failed during shutdown");
            }
        }));

        if tokio::time::timeout(grace, joined).await.is_err() {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "Publisher tasks did not stop within grace period, aborting"
            );
            for abort in aborts {
                abort.abort();
            }
        }

        self.supervisor.close().await;

        let dropped = self.retry_table.clear();
        if dropped > 0 {
            warn!(dropped, "Dropped undelivered retry table entries on shutdown");
        }

        info!("Publisher stopped");
    }
}

#[async_trait]
impl MessagePublisher for Publisher {
    async fn publish(&self, message: &NotificationMessage) -> Result<()> {
        self.queue.enqueue_or_send(message.clone()).await
    }

    async fn publish_now(&self, message: &NotificationMessage) -> Result<()> {
        let payload = message.to_payload()?;
        self.supervisor.publish(&payload, self.publish_timeout).await
    }

    fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }
}
