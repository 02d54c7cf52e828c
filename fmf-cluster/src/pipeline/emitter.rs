//! Source emitter: one simulated moving object

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use fmf_core::resilience::retry::RetryPolicy;
use fmf_core::{Config, LocationUpdate};

use crate::sync::{connect_with_retry, sleep_or_cancel, ChannelService};

#[derive(Debug, Clone)]
pub struct SourceEmitterConfig {
    pub source_id: i64,
    pub channel: String,
    pub period: Duration,
    pub step: f64,
    pub policy: RetryPolicy,
}

impl SourceEmitterConfig {
    #[must_use]
    pub fn from_config(source_id: i64, config: &Config) -> Self {
        Self {
            source_id,
            channel: config.channels.raw.clone(),
            period: config.emitter.period(),
            step: config.emitter.step,
            policy: RetryPolicy::from(&config.broker),
        }
    }
}

/// Counters reported when an emitter stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitterStats {
    pub published: u64,
    pub failed: u64,
}

/// Publishes a drifting position for one source on a fixed period
pub struct SourceEmitter {
    service: Arc<dyn ChannelService>,
    config: SourceEmitterConfig,
}

impl SourceEmitter {
    pub fn new(service: Arc<dyn ChannelService>, config: SourceEmitterConfig) -> Self {
        Self { service, config }
    }

    #[must_use]
    pub const fn config(&self) -> &SourceEmitterConfig {
        &self.config
    }

    /// Publish until cancelled.
    ///
    /// A failed publish skips that tick; the position advances either way.
    pub async fn run(&self, cancel: CancellationToken) -> EmitterStats {
        let mut stats = EmitterStats::default();
        let source_id = self.config.source_id;
        let what = format!("{} publisher for source {source_id}", self.service.name());

        let Some(mut publisher) = connect_with_retry(&what, self.config.policy, &cancel, || {
            self.service.connect_publisher()
        })
        .await
        else {
            info!(source_id = source_id, "Emitter cancelled before connecting");
            return stats;
        };

        info!(
            source_id = source_id,
            channel = %self.config.channel,
            period_ms = u64::try_from(self.config.period.as_millis()).unwrap_or(u64::MAX),
            "Emitter started"
        );

        let mut position = LocationUpdate::initial(source_id);

        while !cancel.is_cancelled() {
            let payload = position.encode();

            match publisher.publish(&self.config.channel, &payload).await {
                Ok(receivers) => {
                    stats.published += 1;
                    info!(source_id = source_id, receivers = receivers, payload = %payload, "Sent");
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(source_id = source_id, error = %e, payload = %payload, "Publish failed, skipping tick");
                }
            }

            position = position.advanced(self.config.step);

            if !sleep_or_cancel(self.config.period, &cancel).await {
                break;
            }
        }

        info!(
            source_id = source_id,
            published = stats.published,
            failed = stats.failed,
            "Emitter shut down"
        );

        stats
    }
}
