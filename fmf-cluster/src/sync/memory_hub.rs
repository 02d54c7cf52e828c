use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use fmf_core::{Error, Result};

use super::channel::{ChannelMessage, ChannelService, Publisher, Subscriber};

/// Handle for a subscription inside the hub
pub type SubscriptionId = u64;

/// Subscriber registration
#[derive(Debug, Clone)]
struct Registration {
    id: SubscriptionId,
    sender: mpsc::UnboundedSender<ChannelMessage>,
}

/// In-process channel service
///
/// Routes payloads between tasks of one process, with the same contract as
/// the Redis broker. Outages can be simulated: while unavailable, connects
/// and publishes fail and every live subscription is cut off.
#[derive(Clone)]
pub struct MemoryChannelService {
    /// Map of channel -> list of subscribers
    channels: Arc<DashMap<String, Vec<Registration>>>,

    /// Pending injected publish failures per channel
    publish_failures: Arc<DashMap<String, usize>>,

    available: Arc<AtomicBool>,
    next_id: Arc<AtomicU64>,
}

impl MemoryChannelService {
    /// Create a new, available hub
    pub fn new() -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            publish_failures: Arc::new(DashMap::new()),
            available: Arc::new(AtomicBool::new(true)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Bring the hub up or down.
    ///
    /// Going down drops every subscription, so their `next_message` returns
    /// `None` once already-queued messages are drained.
    pub fn set_available(&self, available: bool) {
        let was = self.available.swap(available, Ordering::SeqCst);
        if was == available {
            return;
        }

        if available {
            info!("Memory channel service available");
        } else {
            let dropped: usize = self.channels.iter().map(|entry| entry.value().len()).sum();
            self.channels.clear();
            warn!(dropped_subscriptions = dropped, "Memory channel service unavailable");
        }
    }

    /// Make the next `count` publishes on `channel` fail
    pub fn fail_next_publishes(&self, channel: &str, count: usize) {
        *self.publish_failures.entry(channel.to_string()).or_insert(0) += count;
    }

    /// Register a subscriber on a channel, returning its receiver
    fn register(&self, channel: &str) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<ChannelMessage>)> {
        if !self.is_available() {
            return Err(Error::Unavailable);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.channels
            .entry(channel.to_string())
            .or_default()
            .push(Registration { id, sender: tx });

        debug!(channel = %channel, subscription_id = id, "Subscribed to channel");

        Ok((id, rx))
    }

    /// Remove a subscription
    fn unregister(&self, channel: &str, id: SubscriptionId) {
        if let Some(mut subscribers) = self.channels.get_mut(channel) {
            subscribers.retain(|sub| sub.id != id);

            // Remove channel entry if no more subscribers
            if subscribers.is_empty() {
                drop(subscribers); // Drop the RefMut before removing
                self.channels.remove_if(channel, |_, subs| subs.is_empty());
                debug!(channel = %channel, "Channel has no more subscribers, removed");
            }
        }
    }

    /// Broadcast a payload to every subscriber of `channel`
    pub fn publish(&self, channel: &str, payload: &str) -> Result<usize> {
        if !self.is_available() {
            return Err(Error::Unavailable);
        }

        if let Some(mut pending) = self.publish_failures.get_mut(channel) {
            if *pending > 0 {
                *pending -= 1;
                return Err(Error::Publish(format!("Injected failure publishing to {channel}")));
            }
        }

        let message = ChannelMessage::new(channel, payload);
        let mut sent_count = 0;

        if let Some(mut subscribers) = self.channels.get_mut(channel) {
            subscribers.retain(|sub| match sub.sender.send(message.clone()) {
                Ok(()) => {
                    sent_count += 1;
                    true
                }
                Err(_) => {
                    debug!(channel = %channel, subscription_id = sub.id, "Subscriber gone, removing");
                    false
                }
            });
        }

        Ok(sent_count)
    }

    /// Get the number of subscribers on a channel
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map_or(0, |subscribers| subscribers.len())
    }

    /// Get the number of channels with at least one subscriber
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for MemoryChannelService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelService for MemoryChannelService {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect_publisher(&self) -> Result<Box<dyn Publisher>> {
        if !self.is_available() {
            return Err(Error::Unavailable);
        }
        Ok(Box::new(MemoryPublisher { hub: self.clone() }))
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscriber>> {
        let (id, receiver) = self.register(channel)?;
        Ok(Box::new(MemorySubscriber {
            hub: self.clone(),
            channel: channel.to_string(),
            id,
            receiver,
        }))
    }
}

pub struct MemoryPublisher {
    hub: MemoryChannelService,
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<usize> {
        self.hub.publish(channel, payload)
    }
}

pub struct MemorySubscriber {
    hub: MemoryChannelService,
    channel: String,
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<ChannelMessage>,
}

#[async_trait]
impl Subscriber for MemorySubscriber {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn next_message(&mut self) -> Option<ChannelMessage> {
        self.receiver.recv().await
    }
}

impl Drop for MemorySubscriber {
    fn drop(&mut self) {
        self.hub.unregister(&self.channel, self.id);
    }
}
