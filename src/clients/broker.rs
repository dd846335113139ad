use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Liveness signals for one broker session. Each token is cancelled once,
/// when the connection (or channel) is closed for any reason. The channel
/// token is a child of the connection token, so a dropped connection also
/// closes the channel.
#[derive(Debug, Clone)]
pub struct LinkSignals {
    pub connection_closed: CancellationToken,
    pub channel_closed: CancellationToken,
}

impl LinkSignals {
    pub fn new() -> Self {
        let connection_closed = CancellationToken::new();
        let channel_closed = connection_closed.child_token();

        Self {
            connection_closed,
            channel_closed,
        }
    }

    pub fn close_all(&self) {
        self.connection_closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.connection_closed.is_cancelled() || self.channel_closed.is_cancelled()
    }
}

impl Default for LinkSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// Establishes sessions against the broker. Connecting verifies that the
/// target exchange exists and never declares topology.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn BrokerSession>>;
}

/// One connection plus one publish channel. Not safe for concurrent
/// publishes; callers serialize access.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Sends a serialized message as a persistent delivery.
    async fn publish(&self, payload: &[u8]) -> Result<()>;

    /// Releases channel and connection. Idempotent.
    async fn close(&self);

    fn signals(&self) -> LinkSignals;
}
