use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool, postgres::PgPoolOptions, types::Json};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    clients::store::NotificationStore,
    error::{Error, Result},
    models::{message::NotificationMessage, record::NotificationRecord, status::NotificationStatus},
};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id UUID PRIMARY KEY,
        message_id TEXT NOT NULL,
        category TEXT NOT NULL,
        body TEXT NOT NULL,
        destination TEXT NOT NULL,
        media_url TEXT,
        metadata JSONB,
        created_at TIMESTAMPTZ NOT NULL,
        status TEXT NOT NULL,
        queued_at TIMESTAMPTZ NOT NULL,
        delivered_at TIMESTAMPTZ,
        retry_count INTEGER NOT NULL DEFAULT 0,
        error TEXT
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS notifications_message_id_idx ON notifications (message_id)",
    "CREATE INDEX IF NOT EXISTS notifications_status_idx ON notifications (status)",
    "CREATE INDEX IF NOT EXISTS notifications_status_retry_created_idx ON notifications (status, retry_count, created_at)",
];

const SELECT_COLUMNS: &str = "id, message_id, category, body, destination, media_url, metadata, \
     created_at, status, queued_at, delivered_at, retry_count, error";

pub struct PgNotificationStore {
    pool: PgPool,
}

#[derive(FromRow)]
struct NotificationRow {
    id: Uuid,
    message_id: String,
    category: String,
    body: String,
    destination: String,
    media_url: Option<String>,
    metadata: Option<Json<HashMap<String, JsonValue>>>,
    created_at: DateTime<Utc>,
    status: String,
    queued_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    retry_count: i32,
    error: Option<String>,
}

impl NotificationRow {
    fn into_record(self) -> Result<NotificationRecord> {
        let status = self.status.parse::<NotificationStatus>().map_err(Error::storage)?;

        Ok(NotificationRecord {
            id: self.id,
            message: NotificationMessage {
                id: self.message_id,
                category: self.category,
                body: self.body,
                destination: self.destination,
                media_url: self.media_url,
                metadata: self.metadata.map(|m| m.0).unwrap_or_default(),
                created_at: self.created_at,
            },
            status,
            queued_at: self.queued_at,
            delivered_at: self.delivered_at,
            retry_count: self.retry_count.max(0) as u32,
            error: self.error,
        })
    }
}

impl PgNotificationStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("Connecting to PostgreSQL database");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| Error::storage(format!("failed to connect to database: {}", e)))?;

        info!("PostgreSQL connection established");

        Ok(Self { pool })
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        debug!("Notification schema ensured");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::storage(format!("database health check failed: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn save(&self, record: &NotificationRecord) -> Result<Uuid> {
        let message = &record.message;
        let metadata = (!message.metadata.is_empty()).then(|| Json(&message.metadata));

        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, message_id, category, body, destination, media_url, metadata,
                created_at, status, queued_at, delivered_at, retry_count, error
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.id)
        .bind(&message.id)
        .bind(&message.category)
        .bind(&message.body)
        .bind(&message.destination)
        .bind(&message.media_url)
        .bind(metadata)
        .bind(message.created_at)
        .bind(record.status.as_str())
        .bind(record.queued_at)
        .bind(record.delivered_at)
        .bind(record.retry_count as i32)
        .bind(&record.error)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, record_id = %record.id, "Failed to save notification");
            Error::storage(format!("failed to save notification: {}", e))
        })?;

        debug!(record_id = %record.id, message_id = %message.id, "Notification saved");

        Ok(record.id)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $2,
                error = COALESCE($3, error),
                retry_count = retry_count + CASE WHEN $3 IS NULL THEN 0 ELSE 1 END,
                delivered_at = CASE WHEN $2 = 'delivered' THEN NOW() ELSE delivered_at END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::storage(format!("failed to update notification status: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(id));
        }

        debug!(record_id = %id, status = %status, "Notification status updated");

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<NotificationRecord>> {
        let query = format!("SELECT {} FROM notifications WHERE id = $1", SELECT_COLUMNS);

        let row = sqlx::query_as::<_, NotificationRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::storage(format!("failed to get notification: {}", e)))?;

        row.map(NotificationRow::into_record).transpose()
    }

    async fn list_by_status(
        &self,
        status: NotificationStatus,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>> {
        let query = format!(
            "SELECT {} FROM notifications WHERE status = $1 ORDER BY created_at ASC LIMIT $2",
            SELECT_COLUMNS
        );

        let rows = sqlx::query_as::<_, NotificationRow>(&query)
            .bind(status.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::storage(format!("failed to list notifications: {}", e)))?;

        rows.into_iter().map(NotificationRow::into_record).collect()
    }
}
