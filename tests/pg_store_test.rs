//! Runs against a live Postgres. Start one and run with
//! `DATABASE_URL=postgres://... cargo test -- --ignored`.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use chrono::{Duration as ChronoDuration, Utc};
use notification_publisher::{
    clients::{database::PgNotificationStore, store::NotificationStore},
    error::Error,
    models::{record::NotificationRecord, status::NotificationStatus},
};
use serde_json::json;
use sqlx::PgPool;
use tokio_test::assert_err;
use uuid::Uuid;

use crate::common::sample_message;

fn database_url() -> Result<String> {
    std::env::var("DATABASE_URL").context("DATABASE_URL must point at a test database")
}

/// Records far enough in the past to sort ahead of live data.
fn record_aged(seconds: i64) -> NotificationRecord {
    let mut message = sample_message();
    message.created_at =
        Utc::now() - ChronoDuration::days(365 * 20) - ChronoDuration::seconds(seconds);
    NotificationRecord::new(message)
}

async fn cleanup(url: &str, ids: &[Uuid]) -> Result<()> {
    let pool = PgPool::connect(url).await?;
    sqlx::query("DELETE FROM notifications WHERE id = ANY($1)")
        .bind(ids)
        .execute(&pool)
        .await?;
    pool.close().await;
    Ok(())
}

/// Test: Postgres store honours the status, retry and ordering contract
#[tokio::test]
#[ignore = "requires a Postgres instance at DATABASE_URL"]
async fn test_postgres_store_contract() -> Result<()> {
    let url = database_url()?;
    let store = PgNotificationStore::connect(&url).await?;
    store.ensure_schema().await?;
    store.health_check().await?;

    let newest = record_aged(10);
    let oldest = record_aged(30);
    let middle = record_aged(20);

    let mut metadata = HashMap::new();
    metadata.insert("severity".to_string(), json!("high"));
    let detailed = NotificationRecord::new(
        sample_message()
            .with_media_url("https://example.com/disk.png".to_string())
            .with_metadata(metadata.clone()),
    );

    let ids = vec![newest.id, oldest.id, middle.id, detailed.id];
    let outcome = exercise_store(&store, &newest, &oldest, &middle, &detailed).await;

    cleanup(&url, &ids).await?;
    outcome
}

async fn exercise_store(
    store: &PgNotificationStore,
    newest: &NotificationRecord,
    oldest: &NotificationRecord,
    middle: &NotificationRecord,
    detailed: &NotificationRecord,
) -> Result<()> {
    for record in [newest, oldest, middle, detailed] {
        assert_eq!(store.save(record).await?, record.id);
    }

    // duplicate message ids are rejected by the unique index
    let mut duplicate = NotificationRecord::new(newest.message.clone());
    duplicate.id = Uuid::new_v4();
    let err = assert_err!(store.save(&duplicate).await);
    assert!(matches!(err, Error::Storage(_)));

    let fetched = store
        .get_by_id(detailed.id)
        .await?
        .ok_or_else(|| anyhow!("saved record not found"))?;
    assert_eq!(fetched.status, NotificationStatus::Pending);
    assert_eq!(fetched.retry_count, 0);
    assert_eq!(fetched.message.id, detailed.message.id);
    assert_eq!(fetched.message.media_url, detailed.message.media_url);
    assert_eq!(fetched.message.metadata, detailed.message.metadata);
    assert!(store.get_by_id(Uuid::new_v4()).await?.is_none());

    let listed = store
        .list_by_status(NotificationStatus::Pending, 1000)
        .await?;
    let ours: Vec<Uuid> = listed
        .iter()
        .map(|record| record.id)
        .filter(|id| [newest.id, oldest.id, middle.id].contains(id))
        .collect();
    assert_eq!(ours, vec![oldest.id, middle.id, newest.id]);
    assert_eq!(
        store
            .list_by_status(NotificationStatus::Pending, 2)
            .await?
            .len(),
        2
    );

    store
        .update_status(oldest.id, NotificationStatus::Failed, Some("timeout"))
        .await?;
    store
        .update_status(oldest.id, NotificationStatus::Pending, None)
        .await?;
    store
        .update_status(oldest.id, NotificationStatus::Failed, Some("still down"))
        .await?;

    let failed = store
        .get_by_id(oldest.id)
        .await?
        .ok_or_else(|| anyhow!("updated record not found"))?;
    assert_eq!(failed.status, NotificationStatus::Failed);
    assert_eq!(failed.retry_count, 2);
    assert_eq!(failed.error.as_deref(), Some("still down"));
    assert!(failed.delivered_at.is_none());

    store
        .update_status(oldest.id, NotificationStatus::Delivered, None)
        .await?;

    let delivered = store
        .get_by_id(oldest.id)
        .await?
        .ok_or_else(|| anyhow!("delivered record not found"))?;
    assert_eq!(delivered.status, NotificationStatus::Delivered);
    assert!(delivered.delivered_at.is_some());
    assert_eq!(delivered.retry_count, 2);
    assert_eq!(delivered.error.as_deref(), Some("still down"));

    let missing = Uuid::new_v4();
    let err = assert_err!(
        store
            .update_status(missing, NotificationStatus::Delivered, None)
            .await
    );
    assert!(matches!(err, Error::NotFound(id) if id == missing));

    Ok(())
}
