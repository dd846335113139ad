use dashmap::DashMap;
use tracing::warn;

use crate::models::message::NotificationMessage;

/// Messages that exhausted their inline publish attempts, keyed by message
/// id. In-memory only: entries do not survive a restart, and the durable
/// store's reconciliation pass is what recovers them.
pub struct RetryTable {
    entries: DashMap<String, NotificationMessage>,
    /// Zero means unbounded.
    max_entries: usize,
}

impl RetryTable {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    /// Returns false when the table is at capacity and the message was not
    /// admitted.
    pub fn insert(&self, message: NotificationMessage) -> bool {
        if self.max_entries > 0
            && self.entries.len() >= self.max_entries
            && !self.entries.contains_key(&message.id)
        {
            warn!(
                message_id = %message.id,
                max_entries = self.max_entries,
                "Retry table is full, leaving message to reconciliation"
            );
            return false;
        }

        self.entries.insert(message.id.clone(), message);
        true
    }

    pub fn remove(&self, id: &str) -> Option<NotificationMessage> {
        self.entries.remove(id).map(|(_, message)| message)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copies the current entries so no shard lock is held while publishing.
    pub fn snapshot(&self) -> Vec<NotificationMessage> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Empties the table, returning how many entries were dropped.
    pub fn clear(&self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> NotificationMessage {
        NotificationMessage::new("alert".into(), "disk full".into(), "+15555550100".into())
    }

    #[test]
    fn test_cap_rejects_new_ids_but_accepts_updates() {
        let table = RetryTable::new(2);
        let first = message();

        assert!(table.insert(first.clone()));
        assert!(table.insert(message()));
        assert!(!table.insert(message()));
        assert!(table.insert(first.clone()));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_zero_cap_is_unbounded() {
        let table = RetryTable::new(0);

        for _ in 0..50 {
            assert!(table.insert(message()));
        }
        assert_eq!(table.clear(), 50);
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_returns_entry() {
        let table = RetryTable::new(10);
        let entry = message();
        table.insert(entry.clone());

        assert_eq!(table.remove(&entry.id), Some(entry.clone()));
        assert!(!table.contains(&entry.id));
        assert!(table.remove(&entry.id).is_none());
    }
}
