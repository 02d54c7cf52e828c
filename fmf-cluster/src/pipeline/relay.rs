//! Relay stage: consume one channel, republish to another
//!
//! Forwarding is best-effort and at most once per hop. A payload whose
//! downstream publish fails is logged and dropped, never requeued, and no
//! idempotence token is attached, so broker-side duplicates propagate as
//! duplicate forwards. Each payload is forwarded before the next one is
//! pulled, which keeps per-subscriber delivery order end to end.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fmf_core::resilience::retry::RetryPolicy;
use fmf_core::{Config, LocationUpdate};

use crate::sync::{
    connect_with_retry, ChannelMessage, ChannelService, MessageHandler, Publisher, StageState,
    SubscriptionLoop,
};

/// Settings for one relay stage
#[derive(Debug, Clone)]
pub struct RelayStageConfig {
    /// Stage name used in logs ("ingest", "forward")
    pub name: String,
    pub upstream: String,
    pub downstream: String,
    pub policy: RetryPolicy,
    /// Do not forward payloads that fail to parse as location updates
    pub drop_malformed: bool,
}

impl RelayStageConfig {
    /// `locations_raw -> locations_mid`
    #[must_use]
    pub fn ingest(config: &Config) -> Self {
        Self::from_config("ingest", &config.channels.raw, &config.channels.mid, config)
    }

    /// `locations_mid -> locations_out`
    #[must_use]
    pub fn forward(config: &Config) -> Self {
        Self::from_config("forward", &config.channels.mid, &config.channels.out, config)
    }

    fn from_config(name: &str, upstream: &str, downstream: &str, config: &Config) -> Self {
        Self {
            name: name.to_string(),
            upstream: upstream.to_string(),
            downstream: downstream.to_string(),
            policy: RetryPolicy::from(&config.broker),
            drop_malformed: config.relay.drop_malformed,
        }
    }
}

/// Counters reported when a relay stage stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub received: u64,
    pub forwarded: u64,
    pub failed: u64,
    pub dropped_malformed: u64,
    pub reconnects: u64,
}

/// Result of handling one upstream payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Forwarded { receivers: usize },
    Failed,
    DroppedMalformed,
}

/// Publishing half of a relay stage
pub struct Forwarder {
    stage: String,
    downstream: String,
    drop_malformed: bool,
    publisher: Box<dyn Publisher>,
    stats: RelayStats,
}

impl Forwarder {
    pub fn new(config: &RelayStageConfig, publisher: Box<dyn Publisher>) -> Self {
        Self {
            stage: config.name.clone(),
            downstream: config.downstream.clone(),
            drop_malformed: config.drop_malformed,
            publisher,
            stats: RelayStats::default(),
        }
    }

    #[must_use]
    pub const fn stats(&self) -> RelayStats {
        self.stats
    }

    /// Forward one payload verbatim; exactly one publish attempt at most.
    pub async fn forward(&mut self, payload: &str) -> ForwardOutcome {
        self.stats.received += 1;

        match LocationUpdate::parse(payload) {
            Ok(update) => {
                debug!(stage = %self.stage, source_id = update.source_id, payload = %payload, "Received");
            }
            Err(e) if self.drop_malformed => {
                warn!(stage = %self.stage, error = %e, payload = %payload, "Dropping malformed payload");
                self.stats.dropped_malformed += 1;
                return ForwardOutcome::DroppedMalformed;
            }
            Err(e) => {
                debug!(stage = %self.stage, error = %e, payload = %payload, "Received unparseable payload, forwarding as-is");
            }
        }

        match self.publisher.publish(&self.downstream, payload).await {
            Ok(receivers) => {
                self.stats.forwarded += 1;
                info!(
                    stage = %self.stage,
                    downstream = %self.downstream,
                    receivers = receivers,
                    payload = %payload,
                    "Forwarded"
                );
                ForwardOutcome::Forwarded { receivers }
            }
            Err(e) => {
                self.stats.failed += 1;
                error!(
                    stage = %self.stage,
                    downstream = %self.downstream,
                    error = %e,
                    payload = %payload,
                    "Publish failed, dropping message"
                );
                ForwardOutcome::Failed
            }
        }
    }
}

#[async_trait]
impl MessageHandler for Forwarder {
    async fn handle(&mut self, message: ChannelMessage) {
        self.forward(&message.payload).await;
    }
}

/// Subscriber on an upstream channel plus publisher on a downstream one
pub struct RelayStage {
    config: RelayStageConfig,
    service: Arc<dyn ChannelService>,
    subscription: SubscriptionLoop,
}

impl RelayStage {
    pub fn new(service: Arc<dyn ChannelService>, config: RelayStageConfig) -> Self {
        let subscription = SubscriptionLoop::new(service.clone(), config.upstream.clone(), config.policy);
        Self {
            config,
            service,
            subscription,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RelayStageConfig {
        &self.config
    }

    /// Watch the stage's connection state
    #[must_use]
    pub fn state(&self) -> watch::Receiver<StageState> {
        self.subscription.state()
    }

    /// Run until cancelled.
    ///
    /// The publisher is connected once, before subscribing; afterwards the
    /// subscription is re-established after every disconnect.
    pub async fn run(&self, cancel: CancellationToken) -> RelayStats {
        info!(
            stage = %self.config.name,
            broker = self.service.name(),
            upstream = %self.config.upstream,
            downstream = %self.config.downstream,
            "Relay stage starting"
        );

        self.subscription.set_state(StageState::Connecting);
        let what = format!("{} publisher for {}", self.service.name(), self.config.name);
        let Some(publisher) = connect_with_retry(&what, self.config.policy, &cancel, || {
            self.service.connect_publisher()
        })
        .await
        else {
            self.subscription.set_state(StageState::Disconnected);
            info!(stage = %self.config.name, "Relay stage cancelled before publisher connected");
            return RelayStats::default();
        };

        let mut forwarder = Forwarder::new(&self.config, publisher);
        let sub_stats = self.subscription.run(&mut forwarder, &cancel).await;

        let stats = RelayStats {
            reconnects: sub_stats.reconnects,
            ..forwarder.stats()
        };

        info!(
            stage = %self.config.name,
            received = stats.received,
            forwarded = stats.forwarded,
            failed = stats.failed,
            dropped_malformed = stats.dropped_malformed,
            reconnects = stats.reconnects,
            "Relay stage shut down"
        );

        stats
    }
}
