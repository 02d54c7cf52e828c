use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client as RedisClient};
use std::pin::Pin;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use fmf_core::config::BrokerConfig;
use fmf_core::{Error, Result};

use super::channel::{ChannelMessage, ChannelService, Publisher, Subscriber};

/// Redis Pub/Sub channel service
///
/// Publishers use a tokio `ConnectionManager`, which reconnects on its own
/// after a failed command, so one dropped message does not poison the ones
/// after it. Subscribers own a dedicated Pub/Sub connection; its message
/// stream ends when Redis goes away, which callers treat as a disconnect.
pub struct RedisChannelService {
    redis_client: RedisClient,
    operation_timeout: Duration,
}

impl RedisChannelService {
    /// Create a new `RedisChannelService`; does not connect yet
    pub fn new(redis_url: &str, operation_timeout: Duration) -> Result<Self> {
        let redis_client = RedisClient::open(redis_url)
            .map_err(|e| Error::Configuration(format!("Invalid Redis URL {redis_url}: {e}")))?;

        Ok(Self {
            redis_client,
            operation_timeout,
        })
    }

    pub fn from_config(config: &BrokerConfig) -> Result<Self> {
        Self::new(&config.url, config.operation_timeout())
    }
}

#[async_trait]
impl ChannelService for RedisChannelService {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn connect_publisher(&self) -> Result<Box<dyn Publisher>> {
        let conn = timeout(
            self.operation_timeout,
            self.redis_client.get_connection_manager(),
        )
        .await
        .map_err(|_| Error::Timeout("Timed out getting Redis connection for publishing".to_string()))?
        .map_err(|e| Error::Connection(format!("Failed to get Redis connection for publishing: {e}")))?;

        Ok(Box::new(RedisPublisher {
            conn,
            operation_timeout: self.operation_timeout,
        }))
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscriber>> {
        let mut pubsub = timeout(self.operation_timeout, self.redis_client.get_async_pubsub())
            .await
            .map_err(|_| Error::Timeout("Timed out getting Redis Pub/Sub connection".to_string()))?
            .map_err(|e| Error::Connection(format!("Failed to get Redis Pub/Sub connection: {e}")))?;

        timeout(self.operation_timeout, pubsub.subscribe(channel))
            .await
            .map_err(|_| Error::Timeout(format!("Timed out subscribing to {channel}")))?
            .map_err(|e| Error::Connection(format!("Failed to subscribe to {channel}: {e}")))?;

        Ok(Box::new(RedisSubscriber {
            channel: channel.to_string(),
            messages: Box::pin(pubsub.into_on_message()),
        }))
    }
}

pub struct RedisPublisher {
    conn: ConnectionManager,
    operation_timeout: Duration,
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<usize> {
        let subscribers: usize = timeout(
            self.operation_timeout,
            self.conn.publish(channel, payload),
        )
        .await
        .map_err(|_| Error::Timeout(format!("Timed out publishing to {channel}")))?
        .map_err(|e| Error::Publish(format!("Failed to publish to {channel}: {e}")))?;

        Ok(subscribers)
    }
}

pub struct RedisSubscriber {
    channel: String,
    messages: Pin<Box<dyn Stream<Item = redis::Msg> + Send>>,
}

#[async_trait]
impl Subscriber for RedisSubscriber {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn next_message(&mut self) -> Option<ChannelMessage> {
        // Stream returning None means the Redis connection was lost
        while let Some(msg) = self.messages.next().await {
            let channel = msg.get_channel_name().to_string();

            match msg.get_payload::<String>() {
                Ok(payload) => {
                    debug!(channel = %channel, payload = %payload, "Received message from Redis");
                    return Some(ChannelMessage { channel, payload });
                }
                Err(e) => {
                    warn!(error = %e, channel = %channel, "Invalid payload");
                }
            }
        }

        None
    }
}
