use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fmf_core::resilience::retry::RetryPolicy;

use super::channel::{ChannelMessage, ChannelService};
use super::retry::{connect_with_retry, sleep_or_cancel};

/// Connection state of a long-running subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Disconnected,
    Connecting,
    Subscribed,
}

impl StageState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
        }
    }
}

/// Consumer of delivered messages.
///
/// Called serially from the subscription loop; a call never overlaps the next.
#[async_trait]
pub trait MessageHandler: Send {
    async fn handle(&mut self, message: ChannelMessage);
}

/// Counters kept by the subscription loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    pub received: u64,
    pub reconnects: u64,
}

/// Subscribe-and-pull loop that survives broker outages
///
/// `Disconnected -> Connecting -> Subscribed -> (message loop) -> Disconnected`,
/// resubscribing after a fixed backoff whenever the subscription drops, until
/// cancelled.
pub struct SubscriptionLoop {
    service: Arc<dyn ChannelService>,
    channel: String,
    policy: RetryPolicy,
    state: watch::Sender<StageState>,
}

impl SubscriptionLoop {
    pub fn new(service: Arc<dyn ChannelService>, channel: impl Into<String>, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(StageState::Disconnected);
        Self {
            service,
            channel: channel.into(),
            policy,
            state,
        }
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Watch state transitions
    #[must_use]
    pub fn state(&self) -> watch::Receiver<StageState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, state: StageState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!(
                channel = %self.channel,
                from = previous.as_str(),
                to = state.as_str(),
                "Stage state changed"
            );
        }
    }

    /// Pull messages into `handler` until cancelled.
    ///
    /// A handler call in progress is allowed to finish; cancellation is
    /// observed between messages and during waits.
    pub async fn run<H>(&self, handler: &mut H, cancel: &CancellationToken) -> SubscriptionStats
    where
        H: MessageHandler + ?Sized,
    {
        let mut stats = SubscriptionStats::default();
        let mut subscribed_before = false;
        let what = format!("{} subscriber on {}", self.service.name(), self.channel);

        loop {
            self.set_state(StageState::Connecting);

            let Some(mut subscriber) = connect_with_retry(&what, self.policy, cancel, || {
                self.service.subscribe(&self.channel)
            })
            .await
            else {
                break;
            };

            if subscribed_before {
                stats.reconnects += 1;
            }
            subscribed_before = true;

            self.set_state(StageState::Subscribed);
            info!(channel = %self.channel, "Ready, waiting for messages");

            loop {
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    msg = subscriber.next_message() => Some(msg),
                };

                match next {
                    // Cancelled
                    None => {
                        self.set_state(StageState::Disconnected);
                        return stats;
                    }
                    Some(Some(message)) => {
                        stats.received += 1;
                        handler.handle(message).await;
                    }
                    // Connection lost
                    Some(None) => break,
                }
            }

            drop(subscriber);
            self.set_state(StageState::Disconnected);
            warn!(
                channel = %self.channel,
                backoff_ms = u64::try_from(self.policy.backoff.as_millis()).unwrap_or(u64::MAX),
                "Subscriber disconnected, resubscribing after backoff"
            );

            if !sleep_or_cancel(self.policy.backoff, cancel).await {
                break;
            }
        }

        self.set_state(StageState::Disconnected);
        stats
    }
}
