use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
};
use tokio::time::{Duration, interval};
use tracing::{debug, info, warn};

use crate::{
    clients::broker::{BrokerSession, BrokerTransport, LinkSignals},
    config::Config,
    error::{Error, Result},
};

const PERSISTENT_DELIVERY: u8 = 2;
const CHANNEL_WATCH_INTERVAL: Duration = Duration::from_millis(500);

pub struct RabbitMqTransport {
    url: String,
    exchange: String,
    routing_key: String,
}

impl RabbitMqTransport {
    pub fn new(url: String, exchange: String, routing_key: String) -> Self {
        Self {
            url,
            exchange,
            routing_key,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.rabbitmq_url.clone(),
            config.rabbitmq_exchange.clone(),
            config.rabbitmq_routing_key.clone(),
        )
    }
}

#[async_trait]
impl BrokerTransport for RabbitMqTransport {
    async fn connect(&self) -> Result<Arc<dyn BrokerSession>> {
        debug!("Connecting to RabbitMQ");

        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| Error::connection(format!("failed to connect to RabbitMQ: {}", e)))?;

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close(200, "channel creation failed").await;
                return Err(Error::connection(format!(
                    "RabbitMQ channel creation failed: {}",
                    e
                )));
            }
        };

        // Passive: the exchange must already exist.
        if let Err(e) = channel
            .exchange_declare(
                self.exchange.as_str(),
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    passive: true,
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
        {
            let _ = connection.close(200, "exchange missing").await;
            return Err(Error::connection(format!(
                "exchange '{}' is not available: {}",
                self.exchange, e
            )));
        }

        let signals = LinkSignals::new();

        let connection_signals = signals.clone();
        connection.on_error(move |err| {
            warn!(error = %err, "RabbitMQ connection error");
            connection_signals.connection_closed.cancel();
        });

        tokio::spawn(watch_channel(channel.clone(), signals.clone()));

        info!(exchange = %self.exchange, "RabbitMQ connection established");

        Ok(Arc::new(RabbitMqSession {
            connection,
            channel,
            exchange: self.exchange.clone(),
            routing_key: self.routing_key.clone(),
            signals,
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct RabbitMqSession {
    connection: Connection,
    channel: Channel,
    exchange: String,
    routing_key: String,
    signals: LinkSignals,
    closed: AtomicBool,
}

#[async_trait]
impl BrokerSession for RabbitMqSession {
    async fn publish(&self, payload: &[u8]) -> Result<()> {
        if self.signals.is_closed() {
            return Err(Error::publish("RabbitMQ channel is closed"));
        }

        let confirm = self
            .channel
            .basic_publish(
                self.exchange.as_str(),
                self.routing_key.as_str(),
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(PERSISTENT_DELIVERY),
            )
            .await
            .map_err(|e| Error::publish(format!("failed to publish message: {}", e)))?;

        confirm
            .await
            .map_err(|e| Error::publish(format!("publish was not confirmed: {}", e)))?;

        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.signals.close_all();

        if self.channel.status().connected() {
            if let Err(e) = self.channel.close(200, "closing").await {
                debug!(error = %e, "RabbitMQ channel close failed");
            }
        }

        if self.connection.status().connected() {
            if let Err(e) = self.connection.close(200, "closing").await {
                debug!(error = %e, "RabbitMQ connection close failed");
            }
        }

        debug!("RabbitMQ session closed");
    }

    fn signals(&self) -> LinkSignals {
        self.signals.clone()
    }
}

async fn watch_channel(channel: Channel, signals: LinkSignals) {
    let mut ticker = interval(CHANNEL_WATCH_INTERVAL);

    loop {
        tokio::select! {
            _ = signals.channel_closed.cancelled() => return,
            _ = ticker.tick() => {
                if !channel.status().connected() {
                    warn!("RabbitMQ channel closed");
                    signals.channel_closed.cancel();
                    return;
                }
            }
        }
    }
}
