use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{message::NotificationMessage, status::NotificationStatus};

/// Durable projection of a notification. Status, retry count, error and
/// delivery time change only through `NotificationStore::update_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub message: NotificationMessage,
    pub status: NotificationStatus,
    pub queued_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,

    pub retry_count: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotificationRecord {
    pub fn new(message: NotificationMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
            status: NotificationStatus::Pending,
            queued_at: Utc::now(),
            delivered_at: None,
            retry_count: 0,
            error: None,
        }
    }

    /// Applies an `update_status` write in memory. Supplying an error
    /// records it and counts one failed attempt.
    pub fn apply_status(&mut self, status: NotificationStatus, error: Option<&str>) {
        self.status = status;

        if let Some(error) = error {
            self.error = Some(error.to_string());
            self.retry_count += 1;
        }

        if status == NotificationStatus::Delivered {
            self.delivered_at = Some(Utc::now());
        }
    }
}
