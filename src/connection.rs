use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicGetOptions, BasicPublishOptions,
        BasicQosOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, Consumer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use async_trait::async_trait;

use crate::error::{DispatchError, Result};
use crate::message::MessageAck;
use crate::transport::{PublishProps, Transport};

/// Configuration for the AMQP connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// AMQP broker URL (e.g., "amqp://localhost:5672")
    pub url: String,
    /// Number of connection retry attempts
    pub max_retries: u32,
    /// Delay between retry attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Channel prefetch count
    pub prefetch_count: u16,
    /// Upper bound on pooled producer channels
    pub pool_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672".to_string(),
            max_retries: 5,
            retry_delay_ms: 1_000,
            prefetch_count: 10,
            pool_size: 10,
        }
    }
}

/// Manages the AMQP connection with reconnection and a pooled set of
/// producer channels.
///
/// Pool acquisition backs reply publication: a caller blocks until a
/// channel frees up, with no timeout imposed.
pub struct ConnectionManager {
    config: ConnectionConfig,
    connection: Arc<RwLock<Option<Arc<Connection>>>>,
    channels: Arc<Mutex<Vec<Channel>>>,
}

impl ConnectionManager {
    /// Create a connection manager with default configuration
    pub fn new(url: impl Into<String>) -> Self {
        let config = ConnectionConfig {
            url: url.into(),
            ..ConnectionConfig::default()
        };
        Self::with_config(config)
    }

    /// Create a connection manager with custom configuration
    pub fn with_config(config: ConnectionConfig) -> Self {
        Self {
            config,
            connection: Arc::new(RwLock::new(None)),
            channels: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Establish the connection, retrying up to the configured attempts
    pub async fn connect(&self) -> Result<()> {
        let mut attempts = 0;

        loop {
            match self.try_connect().await {
                Ok(connection) => {
                    info!("connected to broker at {}", self.config.url);
                    *self.connection.write().await = Some(Arc::new(connection));
                    return Ok(());
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.config.max_retries {
                        error!("giving up on broker after {attempts} attempts: {e}");
                        return Err(e);
                    }
                    warn!(
                        "connection attempt {attempts} failed, retrying in {}ms: {e}",
                        self.config.retry_delay_ms
                    );
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
            }
        }
    }

    async fn try_connect(&self) -> Result<Connection> {
        debug!("connecting to {}", self.config.url);
        let connection = Connection::connect(
            &self.config.url,
            lapin::ConnectionProperties::default()
                .with_connection_name(format!("switchboard-{}", uuid::Uuid::new_v4()).into()),
        )
        .await?;
        Ok(connection)
    }

    /// Acquire a channel from the pool, creating one if none is free
    pub async fn get_channel(&self) -> Result<Channel> {
        {
            let mut channels = self.channels.lock().await;
            if let Some(channel) = channels.pop() {
                if channel.status().connected() {
                    return Ok(channel);
                }
            }
        }

        let connection = self.ensure_connected().await?;
        let channel = connection.create_channel().await?;
        channel
            .basic_qos(self.config.prefetch_count, BasicQosOptions::default())
            .await?;
        debug!("created new channel");
        Ok(channel)
    }

    /// Return a channel to the pool for reuse
    pub async fn return_channel(&self, channel: Channel) {
        if channel.status().connected() {
            let mut channels = self.channels.lock().await;
            if channels.len() < self.config.pool_size {
                channels.push(channel);
            }
        }
    }

    async fn ensure_connected(&self) -> Result<Arc<Connection>> {
        {
            let connection_guard = self.connection.read().await;
            if let Some(connection) = connection_guard.as_ref() {
                if connection.status().connected() {
                    return Ok(Arc::clone(connection));
                }
            }
        }

        warn!("connection lost, reconnecting");
        self.connect().await?;

        let connection_guard = self.connection.read().await;
        connection_guard.as_ref().cloned().ok_or_else(|| {
            DispatchError::Config("connection should exist after connect".to_string())
        })
    }

    /// Declare `name` and, when a named exchange is configured, bind it
    /// under `routing_key`
    pub async fn declare_queue(
        &self,
        name: &str,
        exchange: &str,
        routing_key: &str,
        durable: bool,
    ) -> Result<()> {
        let channel = self.get_channel().await?;

        channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        if !exchange.is_empty() {
            channel
                .queue_bind(
                    name,
                    exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        self.return_channel(channel).await;
        debug!("declared queue {name:?}");
        Ok(())
    }

    /// Create a consumer on `queue`. The channel is returned alongside
    /// because deliveries must be acknowledged on the channel that
    /// carried them.
    pub async fn create_consumer(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<(Channel, Consumer)> {
        let channel = self.get_channel().await?;

        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    exclusive: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        debug!("created consumer for queue {queue:?}");
        Ok((channel, consumer))
    }

    /// Publish `payload` and wait for broker confirmation
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        props: PublishProps,
    ) -> Result<()> {
        let channel = self.get_channel().await?;

        let mut properties = BasicProperties::default();
        if let Some(correlation_id) = props.correlation_id {
            properties = properties.with_correlation_id(correlation_id.into());
        }
        if let Some(reply_to) = props.reply_to {
            properties = properties.with_reply_to(reply_to.into());
        }

        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await?
            .await?;

        self.return_channel(channel).await;
        debug!("published message to {routing_key:?}");
        Ok(())
    }

    /// Poll one message off `queue`, acknowledging it
    pub async fn get(&self, queue: &str) -> Result<Option<Vec<u8>>> {
        let channel = self.get_channel().await?;

        let fetched = channel.basic_get(queue, BasicGetOptions::default()).await?;
        let payload = match fetched {
            Some(message) => {
                channel
                    .basic_ack(message.delivery_tag, BasicAckOptions::default())
                    .await?;
                Some(message.data.clone())
            }
            None => None,
        };

        self.return_channel(channel).await;
        Ok(payload)
    }

    /// Whether the underlying connection is up
    pub async fn is_connected(&self) -> bool {
        let connection_guard = self.connection.read().await;
        connection_guard
            .as_ref()
            .map(|connection| connection.status().connected())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .finish()
    }
}

/// [`Transport`] backed by the pooled lapin connection
#[derive(Debug, Clone)]
pub struct AmqpTransport {
    connection: Arc<ConnectionManager>,
}

impl AmqpTransport {
    /// Wrap a connection manager as the dispatch layer's transport
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn declare_queue(
        &self,
        name: &str,
        exchange: &str,
        routing_key: &str,
        durable: bool,
    ) -> Result<()> {
        self.connection
            .declare_queue(name, exchange, routing_key, durable)
            .await
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        props: PublishProps,
    ) -> Result<()> {
        self.connection
            .publish(exchange, routing_key, payload, props)
            .await
    }

    async fn get(&self, queue: &str) -> Result<Option<Vec<u8>>> {
        self.connection.get(queue).await
    }
}

/// Acknowledges one delivery on the channel that carried it
pub(crate) struct ChannelAck {
    pub(crate) channel: Channel,
    pub(crate) delivery_tag: u64,
}

#[async_trait]
impl MessageAck for ChannelAck {
    async fn ack(&self) -> Result<()> {
        self.channel
            .basic_ack(self.delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }
}
