use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    clients::store::NotificationStore,
    error::{Error, Result},
    models::{record::NotificationRecord, status::NotificationStatus},
};

/// In-process store with the same semantics as the Postgres adapter.
/// Contents do not survive a restart.
#[derive(Default)]
pub struct MemoryNotificationStore {
    records: RwLock<HashMap<Uuid, NotificationRecord>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn save(&self, record: &NotificationRecord) -> Result<Uuid> {
        let mut records = self.records.write().await;

        if records.contains_key(&record.id)
            || records.values().any(|r| r.message.id == record.message.id)
        {
            return Err(Error::storage(format!(
                "duplicate notification {}",
                record.message.id
            )));
        }

        records.insert(record.id, record.clone());
        Ok(record.id)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(Error::NotFound(id))?;

        record.apply_status(status, error);
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<NotificationRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list_by_status(
        &self,
        status: NotificationStatus,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>> {
        let records = self.records.read().await;

        let mut matching: Vec<NotificationRecord> = records
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();

        matching.sort_by_key(|r| r.message.created_at);
        matching.truncate(limit);

        Ok(matching)
    }
}
