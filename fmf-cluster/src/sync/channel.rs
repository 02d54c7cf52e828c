//! Channel service contract shared by the Redis and in-memory brokers
//!
//! A channel service broadcasts every published payload to all listeners
//! currently subscribed to the same channel name. Delivery is at-least-once
//! per subscriber, unordered across channels, and nothing is persisted.

use async_trait::async_trait;
use fmf_core::Result;

/// A payload delivered on a named channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub channel: String,
    pub payload: String,
}

impl ChannelMessage {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Sending half of a broker connection
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send {
    /// Publish `payload` on `channel`.
    ///
    /// Returns once the broker accepted the message, with the number of
    /// subscribers it was handed to. It does not wait for consumers.
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<usize>;
}

/// Receiving half of a broker connection, bound to one channel
#[async_trait]
pub trait Subscriber: Send {
    fn channel(&self) -> &str;

    /// Next delivered message, or `None` once the connection is gone.
    async fn next_message(&mut self) -> Option<ChannelMessage>;
}

/// Factory for publisher and subscriber connections
#[async_trait]
pub trait ChannelService: Send + Sync {
    /// Short name used in logs ("redis", "memory")
    fn name(&self) -> &'static str;

    async fn connect_publisher(&self) -> Result<Box<dyn Publisher>>;

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscriber>>;
}
