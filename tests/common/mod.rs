#![allow(dead_code)]

use std::{
    future::Future,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use notification_publisher::{
    clients::{
        broker::{BrokerSession, BrokerTransport, LinkSignals},
        memory::MemoryNotificationStore,
        store::NotificationStore,
    },
    error::{Error, Result},
    models::{
        message::NotificationMessage, publisher::PublisherConfig, record::NotificationRecord,
        status::NotificationStatus,
    },
    publisher::MessagePublisher,
};
use tokio::time::{Duration, Instant, sleep};
use uuid::Uuid;

#[derive(Default)]
pub struct FakeBrokerState {
    reachable: AtomicBool,
    fail_publishes: AtomicBool,
    close_delay_ms: AtomicU64,
    connect_attempts: AtomicUsize,
    publish_attempts: AtomicUsize,
    published: Mutex<Vec<NotificationMessage>>,
    signals: Mutex<Option<LinkSignals>>,
}

/// In-process broker. Sessions record every accepted payload and expose
/// their liveness signals so tests can drop the link on demand.
#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<FakeBrokerState>,
}

impl FakeBroker {
    pub fn new(reachable: bool) -> Self {
        let broker = Self::default();
        broker.set_reachable(reachable);
        broker
    }

    pub fn transport(&self) -> Arc<dyn BrokerTransport> {
        Arc::new(self.clone())
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_fail_publishes(&self, fail: bool) {
        self.state.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Sessions take this long to close before their signals fire.
    pub fn set_close_delay(&self, delay: Duration) {
        self.state
            .close_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Broker becomes unreachable and the current connection drops.
    pub fn go_down(&self) {
        self.set_reachable(false);
        self.drop_connection();
    }

    pub fn come_up(&self) {
        self.set_reachable(true);
    }

    pub fn drop_connection(&self) {
        if let Some(signals) = self.state.signals.lock().unwrap().as_ref() {
            signals.connection_closed.cancel();
        }
    }

    pub fn drop_channel(&self) {
        if let Some(signals) = self.state.signals.lock().unwrap().as_ref() {
            signals.channel_closed.cancel();
        }
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn publish_attempts(&self) -> usize {
        self.state.publish_attempts.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<NotificationMessage> {
        self.state.published.lock().unwrap().clone()
    }

    pub fn published_total(&self) -> usize {
        self.state.published.lock().unwrap().len()
    }

    pub fn published_count(&self, id: &str) -> usize {
        self.state
            .published
            .lock()
            .unwrap()
            .iter()
            .filter(|message| message.id == id)
            .count()
    }
}

#[async_trait]
impl BrokerTransport for FakeBroker {
    async fn connect(&self) -> Result<Arc<dyn BrokerSession>> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);

        if !self.state.reachable.load(Ordering::SeqCst) {
            return Err(Error::connection("broker unreachable"));
        }

        let signals = LinkSignals::new();
        *self.state.signals.lock().unwrap() = Some(signals.clone());

        Ok(Arc::new(FakeSession {
            state: self.state.clone(),
            signals,
        }))
    }
}

struct FakeSession {
    state: Arc<FakeBrokerState>,
    signals: LinkSignals,
}

#[async_trait]
impl BrokerSession for FakeSession {
    async fn publish(&self, payload: &[u8]) -> Result<()> {
        self.state.publish_attempts.fetch_add(1, Ordering::SeqCst);

        if self.signals.is_closed() {
            return Err(Error::publish("channel is closed"));
        }

        if self.state.fail_publishes.load(Ordering::SeqCst) {
            return Err(Error::publish("broker rejected publish"));
        }

        let message: NotificationMessage = serde_json::from_slice(payload)
            .map_err(|e| Error::publish(format!("undecodable payload: {}", e)))?;
        self.state.published.lock().unwrap().push(message);

        Ok(())
    }

    async fn close(&self) {
        let delay = self.state.close_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }
        self.signals.close_all();
    }

    fn signals(&self) -> LinkSignals {
        self.signals.clone()
    }
}

/// Publisher double for service tests. Records what it was handed.
#[derive(Default)]
pub struct StubPublisher {
    failing: AtomicBool,
    queued: Mutex<Vec<NotificationMessage>>,
    direct: Mutex<Vec<NotificationMessage>>,
}

impl StubPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let publisher = Self::default();
        publisher.set_failing(true);
        publisher
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn queued(&self) -> Vec<NotificationMessage> {
        self.queued.lock().unwrap().clone()
    }

    pub fn direct(&self) -> Vec<NotificationMessage> {
        self.direct.lock().unwrap().clone()
    }

    fn outcome(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::publish("disk full"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MessagePublisher for StubPublisher {
    async fn publish(&self, message: &NotificationMessage) -> Result<()> {
        self.queued.lock().unwrap().push(message.clone());
        self.outcome()
    }

    async fn publish_now(&self, message: &NotificationMessage) -> Result<()> {
        self.direct.lock().unwrap().push(message.clone());
        self.outcome()
    }

    fn is_connected(&self) -> bool {
        !self.failing.load(Ordering::SeqCst)
    }
}

/// Memory store whose writes can be switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryNotificationStore,
    fail_saves: AtomicBool,
    fail_updates: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationStore for FlakyStore {
    async fn save(&self, record: &NotificationRecord) -> Result<Uuid> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::storage("database unavailable"));
        }
        self.inner.save(record).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
        error: Option<&str>,
    ) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Error::storage("database unavailable"));
        }
        self.inner.update_status(id, status, error).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<NotificationRecord>> {
        self.inner.get_by_id(id).await
    }

    async fn list_by_status(
        &self,
        status: NotificationStatus,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>> {
        self.inner.list_by_status(status, limit).await
    }
}

/// Publisher settings scaled down to milliseconds.
pub fn fast_config() -> PublisherConfig {
    PublisherConfig {
        reconnect_delay: Duration::from_millis(20),
        queue_capacity: 16,
        inline_attempts: 3,
        inline_retry_pause: Duration::from_millis(20),
        publish_timeout: Duration::from_millis(500),
        sweep_interval: Duration::from_millis(20),
        max_retry_entries: 100,
    }
}

pub fn sample_message() -> NotificationMessage {
    NotificationMessage::new(
        "alert".to_string(),
        "disk full".to_string(),
        "+15555550100".to_string(),
    )
}

/// Polls `condition` every 10ms until it holds or `limit` elapses.
pub async fn wait_until<F, Fut>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + limit;

    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}
