//! Receiver side of the pipeline: latest position per source

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fmf_core::resilience::retry::RetryPolicy;
use fmf_core::{Config, LocationUpdate, ParseError};

use crate::sync::{ChannelMessage, ChannelService, MessageHandler, StageState, SubscriptionLoop};

/// Number of tracked sources unless configured otherwise
pub const DEFAULT_POPULATION: usize = 5;

/// Result of applying one update to [`KnownState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Updated { slot: usize },
    OutOfRange,
}

/// Most recent update for one source, with the payload it arrived in
#[derive(Debug, Clone, PartialEq)]
pub struct LatestPosition {
    pub update: LocationUpdate,
    /// Received text, surrounding whitespace removed
    pub payload: String,
}

/// Latest known position per source id, one slot per id in `0..population`
#[derive(Debug)]
pub struct KnownState {
    slots: Mutex<Vec<Option<LatestPosition>>>,
}

impl KnownState {
    #[must_use]
    pub fn new(population: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; population]),
        }
    }

    #[must_use]
    pub fn population(&self) -> usize {
        self.slots.lock().len()
    }

    /// Overwrite the slot for `update.source_id`; ids outside the table change nothing.
    pub fn apply(&self, update: LocationUpdate) -> ApplyOutcome {
        let payload = update.encode();
        Self::record_locked(&mut self.slots.lock(), update, &payload)
    }

    /// Record `update` as received in `payload` and copy the table under the
    /// same lock. Returns `None`, without copying, when the id is out of range.
    pub fn record_and_snapshot(&self, update: LocationUpdate, payload: &str) -> Option<Snapshot> {
        let mut slots = self.slots.lock();
        match Self::record_locked(&mut slots, update, payload) {
            ApplyOutcome::Updated { .. } => Some(Snapshot { slots: slots.clone() }),
            ApplyOutcome::OutOfRange => None,
        }
    }

    fn record_locked(
        slots: &mut [Option<LatestPosition>],
        update: LocationUpdate,
        payload: &str,
    ) -> ApplyOutcome {
        match update.slot(slots.len()) {
            Some(slot) => {
                slots[slot] = Some(LatestPosition {
                    update,
                    payload: payload.trim().to_string(),
                });
                ApplyOutcome::Updated { slot }
            }
            None => ApplyOutcome::OutOfRange,
        }
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<LocationUpdate> {
        self.slots.lock().get(slot).and_then(|entry| entry.as_ref().map(|e| e.update))
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            slots: self.slots.lock().clone(),
        }
    }
}

impl Default for KnownState {
    fn default() -> Self {
        Self::new(DEFAULT_POPULATION)
    }
}

/// Point-in-time copy of [`KnownState`]
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    slots: Vec<Option<LatestPosition>>,
}

impl Snapshot {
    #[must_use]
    pub fn slots(&self) -> &[Option<LatestPosition>] {
        &self.slots
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<LocationUpdate> {
        self.slots.get(slot).and_then(|entry| entry.as_ref().map(|e| e.update))
    }

    #[must_use]
    pub fn known(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "[receiver] latest positions:")?;
        for (idx, slot) in self.slots.iter().enumerate() {
            match slot {
                Some(latest) => writeln!(f, "  {}", latest.payload)?,
                None => writeln!(f, "  {idx} -> (no data yet)")?,
            }
        }
        Ok(())
    }
}

/// Result of ingesting one payload
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOutcome {
    Applied(Snapshot),
    Malformed(ParseError),
    OutOfRange(LocationUpdate),
}

/// Counters reported when the aggregator stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub received: u64,
    pub applied: u64,
    pub malformed: u64,
    pub out_of_range: u64,
}

/// Subscribes to the output channel and keeps [`KnownState`] current
pub struct Aggregator {
    state: Arc<KnownState>,
    subscription: SubscriptionLoop,
}

impl Aggregator {
    pub fn new(
        service: Arc<dyn ChannelService>,
        channel: impl Into<String>,
        population: usize,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            state: Arc::new(KnownState::new(population)),
            subscription: SubscriptionLoop::new(service, channel, policy),
        }
    }

    pub fn from_config(service: Arc<dyn ChannelService>, config: &Config) -> Self {
        Self::new(
            service,
            config.channels.out.clone(),
            config.aggregator.population,
            RetryPolicy::from(&config.broker),
        )
    }

    /// Shared handle to the state table
    #[must_use]
    pub fn known_state(&self) -> Arc<KnownState> {
        self.state.clone()
    }

    #[must_use]
    pub fn state(&self) -> watch::Receiver<StageState> {
        self.subscription.state()
    }

    /// Parse and apply one payload
    pub fn ingest(&self, payload: &str) -> AggregateOutcome {
        let update = match LocationUpdate::parse(payload) {
            Ok(update) => update,
            Err(e) => {
                debug!(error = %e, payload = %payload, "Discarding malformed payload");
                return AggregateOutcome::Malformed(e);
            }
        };

        match self.state.record_and_snapshot(update, payload) {
            Some(snapshot) => {
                debug!(source_id = update.source_id, "Applied location update");
                AggregateOutcome::Applied(snapshot)
            }
            None => {
                warn!(
                    source_id = update.source_id,
                    population = self.state.population(),
                    "Discarding update for unknown source"
                );
                AggregateOutcome::OutOfRange(update)
            }
        }
    }

    /// Run until cancelled, rendering a snapshot to `out` after every applied update.
    pub async fn run<W>(&self, out: &mut W, cancel: CancellationToken) -> AggregatorStats
    where
        W: Write + Send + ?Sized,
    {
        info!(
            channel = %self.subscription.channel(),
            population = self.state.population(),
            "Aggregator starting"
        );

        let mut renderer = Renderer {
            aggregator: self,
            out,
            stats: AggregatorStats::default(),
        };
        self.subscription.run(&mut renderer, &cancel).await;
        let stats = renderer.stats;

        info!(
            received = stats.received,
            applied = stats.applied,
            malformed = stats.malformed,
            out_of_range = stats.out_of_range,
            "Aggregator shut down"
        );

        stats
    }
}

struct Renderer<'a, W: ?Sized> {
    aggregator: &'a Aggregator,
    out: &'a mut W,
    stats: AggregatorStats,
}

#[async_trait]
impl<'a, W> MessageHandler for Renderer<'a, W>
where
    W: Write + Send + ?Sized,
{
    async fn handle(&mut self, message: ChannelMessage) {
        self.stats.received += 1;

        match self.aggregator.ingest(&message.payload) {
            AggregateOutcome::Applied(snapshot) => {
                self.stats.applied += 1;
                if let Err(e) = write!(self.out, "{snapshot}").and_then(|()| self.out.flush()) {
                    error!(error = %e, "Failed to write snapshot");
                }
            }
            AggregateOutcome::Malformed(_) => self.stats.malformed += 1,
            AggregateOutcome::OutOfRange(_) => self.stats.out_of_range += 1,
        }
    }
}
