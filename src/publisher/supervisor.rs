//! Broker connection lifecycle.
//!
//! The supervisor owns the single broker session and the connected flag.
//! Every transition (connect, disconnect, close) happens under one lock;
//! readers get a lock-free snapshot of the flag through a watch channel.

use std::sync::Arc;

use tokio::{
    sync::{Mutex, watch},
    time::{Duration, sleep, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    clients::broker::{BrokerSession, BrokerTransport, LinkSignals},
    error::{Error, Result},
    models::status::ConnectionState,
};

struct LinkState {
    state: ConnectionState,
    session: Option<Arc<dyn BrokerSession>>,
    /// Bumped on every successful connect so stale close signals can be
    /// told apart from the current session's.
    generation: u64,
}

pub struct ConnectionSupervisor {
    transport: Arc<dyn BrokerTransport>,
    link: Mutex<LinkState>,
    publish_lock: Mutex<()>,
    connected: watch::Sender<bool>,
    reconnect_delay: Duration,
}

impl ConnectionSupervisor {
    pub fn new(transport: Arc<dyn BrokerTransport>, reconnect_delay: Duration) -> Self {
        let (connected, _) = watch::channel(false);

        Self {
            transport,
            link: Mutex::new(LinkState {
                state: ConnectionState::Disconnected,
                session: None,
                generation: 0,
            }),
            publish_lock: Mutex::new(()),
            connected,
            reconnect_delay,
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub async fn state(&self) -> ConnectionState {
        self.link.lock().await.state
    }

    pub async fn generation(&self) -> u64 {
        self.link.lock().await.generation
    }

    /// Waits up to `limit` for the link to come up. Returns whether it did.
    pub async fn wait_connected(&self, limit: Duration) -> bool {
        let mut receiver = self.connected.subscribe();

        matches!(
            timeout(limit, receiver.wait_for(|connected| *connected)).await,
            Ok(Ok(_))
        )
    }

    /// One connection attempt. A no-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.link.lock().await;

        if link.state == ConnectionState::Connected {
            return Ok(());
        }

        link.state = ConnectionState::Connecting;

        match self.transport.connect().await {
            Ok(session) => {
                link.session = Some(session);
                link.generation += 1;
                link.state = ConnectionState::Connected;
                self.connected.send_replace(true);

                info!(generation = link.generation, "Connected to message broker");
                Ok(())
            }
            Err(e) => {
                link.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Moves `generation` from connected to disconnected and releases its
    /// session. Returns false when that generation is no longer current.
    /// The session itself is closed on its own task, outside the link lock.
    pub async fn handle_disconnect(&self, generation: u64) -> bool {
        let session = {
            let mut link = self.link.lock().await;

            if link.generation != generation || link.state != ConnectionState::Connected {
                return false;
            }

            link.state = ConnectionState::Disconnected;
            self.connected.send_replace(false);
            link.session.take()
        };

        if let Some(session) = session {
            tokio::spawn(async move { session.close().await });
        }

        warn!(generation, "Disconnected from message broker");
        true
    }

    /// Publishes one payload. Publishes are serialized; the whole call,
    /// including waiting for the publish slot, is bounded by `deadline`.
    pub async fn publish(&self, payload: &[u8], deadline: Duration) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::publish("not connected to message broker"));
        }

        match timeout(deadline, self.publish_serialized(payload)).await {
            Ok(result) => result,
            Err(_) => Err(Error::publish(format!(
                "publish did not complete within {}ms",
                deadline.as_millis()
            ))),
        }
    }

    async fn publish_serialized(&self, payload: &[u8]) -> Result<()> {
        let _slot = self.publish_lock.lock().await;

        let (session, generation) = {
            let link = self.link.lock().await;
            match (&link.session, link.state) {
                (Some(session), ConnectionState::Connected) => (session.clone(), link.generation),
                _ => return Err(Error::publish("not connected to message broker")),
            }
        };

        if let Err(e) = session.publish(payload).await {
            warn!(error = %e, generation, "Publish failed, dropping broker session");
            self.handle_disconnect(generation).await;
            return Err(e);
        }

        Ok(())
    }

    /// Supervisor loop: waits for the current session to close, then
    /// reconnects on a fixed delay. Never gives up; exits only on shutdown.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            if !self.is_connected() && !self.reconnect(&shutdown).await {
                break;
            }

            let Some((signals, generation)) = self.current_signals().await else {
                continue;
            };

            let mut connected = self.connected.subscribe();
            let dropped = async move { connected.wait_for(|up| !*up).await.is_ok() };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = dropped => {
                    debug!(generation, "Broker session invalidated, reconnecting");
                }
                _ = signals.connection_closed.cancelled() => {
                    warn!(generation, "Broker connection closed, reconnecting");
                }
                _ = signals.channel_closed.cancelled() => {
                    warn!(generation, "Broker channel closed, reconnecting");
                }
            }

            self.handle_disconnect(generation).await;
        }

        debug!("Connection supervisor stopped");
    }

    async fn current_signals(&self) -> Option<(LinkSignals, u64)> {
        let link = self.link.lock().await;

        match (&link.session, link.state) {
            (Some(session), ConnectionState::Connected) => {
                Some((session.signals(), link.generation))
            }
            _ => None,
        }
    }

    async fn reconnect(&self, shutdown: &CancellationToken) -> bool {
        let mut attempt: u32 = 0;

        loop {
            if self.is_connected() {
                return true;
            }

            debug!(
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "Attempting to reconnect to message broker"
            );

            tokio::select! {
                _ = shutdown.cancelled() => return false,
                _ = sleep(self.reconnect_delay) => {}
            }

            attempt += 1;

            match self.connect().await {
                Ok(()) => {
                    info!(attempt, "Reconnected to message broker");
                    return true;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Failed to reconnect to message broker");
                }
            }
        }
    }

    /// Releases the session and marks the link disconnected. Idempotent.
    pub async fn close(&self) {
        let session = {
            let mut link = self.link.lock().await;

            link.state = ConnectionState::Disconnected;
            self.connected.send_replace(false);
            link.session.take()
        };

        if let Some(session) = session {
            session.close().await;
            info!("Message broker connection closed");
        }
    }
}
