use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{Error, Result};

/// The unit handed to the broker. Field names on the wire follow the
/// downstream consumer's contract (`type`, `message`, `phone`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub id: String,

    #[serde(rename = "type")]
    pub category: String,

    #[serde(rename = "message")]
    pub body: String,

    #[serde(rename = "phone")]
    pub destination: String,

    #[serde(rename = "image_url", default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,

    #[serde(rename = "extra_info", default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, JsonValue>,

    pub created_at: DateTime<Utc>,
}

impl NotificationMessage {
    pub fn new(category: String, body: String, destination: String) -> Self {
        Self {
            // v7 ids sort by creation time and stay unique within the same instant
            id: Uuid::now_v7().to_string(),
            category,
            body,
            destination,
            media_url: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_media_url(mut self, media_url: String) -> Self {
        self.media_url = Some(media_url);
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, JsonValue>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::publish(format!("failed to serialize message {}: {}", self.id, e)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRequest {
    #[serde(rename = "type", default)]
    pub category: String,

    #[serde(rename = "message", default)]
    pub body: String,

    #[serde(rename = "phone", default)]
    pub destination: String,

    #[serde(rename = "image_url", default)]
    pub media_url: Option<String>,

    #[serde(rename = "extra_info", default)]
    pub metadata: Option<HashMap<String, JsonValue>>,
}

impl NotificationRequest {
    pub fn new(category: &str, body: &str, destination: &str) -> Self {
        Self {
            category: category.to_string(),
            body: body.to_string(),
            destination: destination.to_string(),
            media_url: None,
            metadata: None,
        }
    }

    pub fn into_message(self) -> NotificationMessage {
        let mut message = NotificationMessage::new(self.category, self.body, self.destination);

        if let Some(media_url) = self.media_url.filter(|url| !url.is_empty()) {
            message = message.with_media_url(media_url);
        }

        if let Some(metadata) = self.metadata {
            message = message.with_metadata(metadata);
        }

        message
    }
}
