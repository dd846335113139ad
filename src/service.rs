use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    clients::store::NotificationStore,
    error::Result,
    models::{
        message::NotificationRequest, publisher::ReconcileConfig, record::NotificationRecord,
        status::NotificationStatus,
    },
    publisher::MessagePublisher,
};

/// Outcome of one reconciliation pass. Every scanned record lands in
/// exactly one of the other counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub skipped: usize,
    pub republished: usize,
    pub failed: usize,
    /// Republished, but the status write back to pending failed.
    pub unrecorded: usize,
}

pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    publisher: Arc<dyn MessagePublisher>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn NotificationStore>, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { store, publisher }
    }

    /// Persists a pending record and hands its message to the publisher.
    ///
    /// Success means the record is stored and the message was accepted for
    /// delivery. A storage failure aborts before anything is published; a
    /// publish failure observed here marks the record failed.
    pub async fn create(&self, request: NotificationRequest) -> Result<Uuid> {
        let record = NotificationRecord::new(request.into_message());

        let id = self.store.save(&record).await?;

        if let Err(e) = self.publisher.publish(&record.message).await {
            warn!(record_id = %id, message_id = %record.message.id, error = %e, "Failed to publish notification");

            if let Err(update_err) = self
                .store
                .update_status(id, NotificationStatus::Failed, Some(&e.to_string()))
                .await
            {
                error!(record_id = %id, error = %update_err, "Failed to update notification status");
            }

            return Err(e);
        }

        info!(
            record_id = %id,
            message_id = %record.message.id,
            category = %record.message.category,
            "Notification accepted for delivery"
        );

        Ok(id)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<NotificationRecord>> {
        self.store.get_by_id(id).await
    }

    pub async fn mark_delivered(&self, id: Uuid) -> Result<()> {
        self.store
            .update_status(id, NotificationStatus::Delivered, None)
            .await
    }

    pub async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<()> {
        self.store
            .update_status(id, NotificationStatus::Failed, Some(reason))
            .await
    }

    /// Re-publishes unresolved (pending or failed) records, oldest first, up
    /// to `batch_size`. Records with `max_retries` recorded failures are
    /// left alone. A successful publish puts the record back to pending; a
    /// failed one records the error. Per-record storage errors are logged
    /// and skipped.
    pub async fn reconcile_pending(
        &self,
        max_retries: u32,
        batch_size: usize,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let mut records = self
            .store
            .list_by_status(NotificationStatus::Pending, batch_size)
            .await?;
        records.extend(
            self.store
                .list_by_status(NotificationStatus::Failed, batch_size)
                .await?,
        );
        records.sort_by_key(|record| record.message.created_at);
        records.truncate(batch_size);

        for record in records {
            report.scanned += 1;

            if record.retry_count >= max_retries {
                report.skipped += 1;
                continue;
            }

            match self.publisher.publish_now(&record.message).await {
                Ok(()) => {
                    match self
                        .store
                        .update_status(record.id, NotificationStatus::Pending, None)
                        .await
                    {
                        Ok(()) => report.republished += 1,
                        Err(e) => {
                            report.unrecorded += 1;
                            warn!(record_id = %record.id, error = %e, "Failed to update notification status");
                        }
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    debug!(record_id = %record.id, error = %e, "Reconciliation publish failed");

                    if let Err(update_err) = self
                        .store
                        .update_status(record.id, NotificationStatus::Failed, Some(&e.to_string()))
                        .await
                    {
                        warn!(record_id = %record.id, error = %update_err, "Failed to update notification status");
                    }
                }
            }
        }

        Ok(report)
    }
}

/// Runs the reconciliation pass on a fixed interval until shutdown.
pub struct ReconcileTask {
    service: Arc<NotificationService>,
    config: ReconcileConfig,
}

impl ReconcileTask {
    pub fn new(service: Arc<NotificationService>, config: ReconcileConfig) -> Self {
        Self { service, config }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.run_once().await,
            }
        }

        debug!("Reconciliation task stopped");
    }

    async fn run_once(&self) {
        match self
            .service
            .reconcile_pending(self.config.max_retries, self.config.batch_size)
            .await
        {
            Ok(report) if report.republished + report.failed + report.unrecorded > 0 => {
                info!(
                    scanned = report.scanned,
                    skipped = report.skipped,
                    republished = report.republished,
                    failed = report.failed,
                    unrecorded = report.unrecorded,
                    "Reconciliation pass completed"
                );
            }
            Ok(report) => {
                debug!(scanned = report.scanned, "Reconciliation pass found nothing to republish");
            }
            Err(e) => {
                error!(error = %e, "Error reconciling unresolved notifications");
            }
        }
    }
}
