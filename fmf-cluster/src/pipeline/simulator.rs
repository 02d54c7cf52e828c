//! Whole pipeline in one process
//!
//! Runs `population` emitters, both relay stages and the aggregator as tasks
//! sharing one cancellation token and one channel service.

use std::io::Write;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use fmf_core::Config;

use super::aggregator::{Aggregator, AggregatorStats, KnownState};
use super::emitter::{EmitterStats, SourceEmitter, SourceEmitterConfig};
use super::relay::{RelayStage, RelayStageConfig, RelayStats};
use crate::sync::ChannelService;

/// Aggregated results of a simulator run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationReport {
    pub emitters: EmitterStats,
    pub ingest: RelayStats,
    pub forward: RelayStats,
    pub aggregator: AggregatorStats,
}

enum TaskResult {
    Emitter(EmitterStats),
    Ingest(RelayStats),
    Forward(RelayStats),
    Aggregator(AggregatorStats),
}

pub struct Simulator {
    service: Arc<dyn ChannelService>,
    config: Config,
    aggregator: Arc<Aggregator>,
}

impl Simulator {
    pub fn new(service: Arc<dyn ChannelService>, config: Config) -> Self {
        let aggregator = Arc::new(Aggregator::from_config(service.clone(), &config));
        Self {
            service,
            config,
            aggregator,
        }
    }

    /// State table filled by the aggregator
    #[must_use]
    pub fn known_state(&self) -> Arc<KnownState> {
        self.aggregator.known_state()
    }

    /// Run every component until `cancel` fires, writing snapshots to `out`.
    pub async fn run<W>(&self, out: W, cancel: CancellationToken) -> SimulationReport
    where
        W: Write + Send + 'static,
    {
        let mut tasks = JoinSet::new();

        {
            let aggregator = self.aggregator.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let mut out = out;
                TaskResult::Aggregator(aggregator.run(&mut out, cancel).await)
            });
        }

        // Downstream first, so the first emitted positions have somewhere to go
        {
            let stage = RelayStage::new(self.service.clone(), RelayStageConfig::forward(&self.config));
            let cancel = cancel.clone();
            tasks.spawn(async move { TaskResult::Forward(stage.run(cancel).await) });
        }
        {
            let stage = RelayStage::new(self.service.clone(), RelayStageConfig::ingest(&self.config));
            let cancel = cancel.clone();
            tasks.spawn(async move { TaskResult::Ingest(stage.run(cancel).await) });
        }

        let population = i64::try_from(self.config.aggregator.population).unwrap_or(i64::MAX);
        for source_id in 0..population {
            let emitter = SourceEmitter::new(
                self.service.clone(),
                SourceEmitterConfig::from_config(source_id, &self.config),
            );
            let cancel = cancel.clone();
            tasks.spawn(async move { TaskResult::Emitter(emitter.run(cancel).await) });
        }

        info!(
            broker = self.service.name(),
            emitters = population,
            "Simulation running"
        );

        let mut report = SimulationReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskResult::Emitter(stats)) => {
                    report.emitters.published += stats.published;
                    report.emitters.failed += stats.failed;
                }
                Ok(TaskResult::Ingest(stats)) => report.ingest = stats,
                Ok(TaskResult::Forward(stats)) => report.forward = stats,
                Ok(TaskResult::Aggregator(stats)) => report.aggregator = stats,
                Err(e) => error!(error = %e, "Simulation task failed"),
            }
        }

        info!(
            published = report.emitters.published,
            applied = report.aggregator.applied,
            "Simulation finished"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::MemoryChannelService;
    use fmf_core::LocationUpdate;
    use std::time::Duration;

    #[tokio::test]
    async fn test_every_source_reaches_the_aggregator() {
        let mut config = Config::default();
        config.emitter.period_ms = 20;
        config.broker.reconnect_backoff_ms = 10;
        config.aggregator.population = 3;

        let simulator = Arc::new(Simulator::new(Arc::new(MemoryChannelService::new()), config));
        let known = simulator.known_state();
        let cancel = CancellationToken::new();

        let task = {
            let simulator = simulator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { simulator.run(std::io::sink(), cancel).await })
        };

        tokio::time::timeout(Duration::from_secs(10), async {
            while known.snapshot().known() < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        let report = task.await.unwrap();

        for source_id in 0..3_i64 {
            let slot = known.get(usize::try_from(source_id).unwrap()).unwrap();
            assert_eq!(slot.source_id, source_id);
            // Somewhere along the drift from the starting point
            assert!(slot.x >= LocationUpdate::initial(source_id).x);
        }
        assert!(report.emitters.published >= 3);
        assert!(report.ingest.forwarded <= report.ingest.received);
        assert!(report.forward.forwarded <= report.forward.received);
        assert!(report.aggregator.applied >= 3);
    }
}
