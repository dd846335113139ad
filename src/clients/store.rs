use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{record::NotificationRecord, status::NotificationStatus},
};

/// Durable storage consumed by the notification service.
///
/// Callers bound each operation with their own deadline by wrapping the
/// returned future; implementations do not retry internally.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn save(&self, record: &NotificationRecord) -> Result<Uuid>;

    /// Sole writer of status, retry count, error text and delivery time.
    /// Supplying `error` records it and increments the retry count;
    /// `Delivered` stamps the delivery time.
    async fn update_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
        error: Option<&str>,
    ) -> Result<()>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<NotificationRecord>>;

    /// Records in `status`, oldest `created_at` first.
    async fn list_by_status(
        &self,
        status: NotificationStatus,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>>;
}
