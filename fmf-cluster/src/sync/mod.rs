// Module: sync

pub mod channel;
pub mod memory_hub;
pub mod redis_pubsub;
pub mod retry;
pub mod subscription;

use std::sync::Arc;

use fmf_core::config::{BrokerConfig, BrokerKind};
use fmf_core::Result;

pub use channel::{ChannelMessage, ChannelService, Publisher, Subscriber};
#[cfg(test)]
pub use channel::MockPublisher;
pub use memory_hub::{MemoryChannelService, MemoryPublisher, MemorySubscriber};
pub use redis_pubsub::{RedisChannelService, RedisPublisher, RedisSubscriber};
pub use retry::{connect_with_retry, sleep_or_cancel};
pub use subscription::{MessageHandler, StageState, SubscriptionLoop, SubscriptionStats};

/// Build the channel service selected by `broker.kind`.
///
/// Each call to the memory kind returns a fresh, isolated hub.
pub fn service_from_config(broker: &BrokerConfig) -> Result<Arc<dyn ChannelService>> {
    match broker.kind {
        BrokerKind::Redis => Ok(Arc::new(RedisChannelService::from_config(broker)?)),
        BrokerKind::Memory => Ok(Arc::new(MemoryChannelService::new())),
    }
}
