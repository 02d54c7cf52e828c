//! End-to-end tests for the relay pipeline over the in-memory broker
//!
//! Run with: cargo test --test pipeline_integration

use std::sync::Arc;
use std::time::Duration;

use fmf_cluster::pipeline::{
    Aggregator, AggregatorStats, KnownState, RelayStage, RelayStageConfig, RelayStats,
};
use fmf_cluster::sync::{ChannelService, MemoryChannelService, StageState, Subscriber};
use fmf_core::resilience::retry::RetryPolicy;
use fmf_core::{Config, LocationUpdate};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Pipeline {
    hub: MemoryChannelService,
    known: Arc<KnownState>,
    states: Vec<watch::Receiver<StageState>>,
    cancel: CancellationToken,
    ingest: JoinHandle<RelayStats>,
    forward: JoinHandle<RelayStats>,
    aggregator: JoinHandle<(AggregatorStats, Vec<u8>)>,
}

impl Pipeline {
    /// Start ingest, forward and the aggregator and wait until all are subscribed
    async fn start() -> Self {
        let hub = MemoryChannelService::new();
        let mut config = Config::default();
        config.broker.reconnect_backoff_ms = 10;

        let service: Arc<dyn ChannelService> = Arc::new(hub.clone());
        let cancel = CancellationToken::new();

        let ingest_stage = RelayStage::new(service.clone(), RelayStageConfig::ingest(&config));
        let forward_stage = RelayStage::new(service.clone(), RelayStageConfig::forward(&config));
        let aggregator = Aggregator::new(
            service,
            config.channels.out.clone(),
            config.aggregator.population,
            RetryPolicy::fixed(Duration::from_millis(10)),
        );

        let states = vec![ingest_stage.state(), forward_stage.state(), aggregator.state()];
        let known = aggregator.known_state();

        let ingest = {
            let cancel = cancel.clone();
            tokio::spawn(async move { ingest_stage.run(cancel).await })
        };
        let forward = {
            let cancel = cancel.clone();
            tokio::spawn(async move { forward_stage.run(cancel).await })
        };
        let aggregator = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut out = Vec::new();
                let stats = aggregator.run(&mut out, cancel).await;
                (stats, out)
            })
        };

        let mut pipeline = Self {
            hub,
            known,
            states,
            cancel,
            ingest,
            forward,
            aggregator,
        };
        pipeline.wait_all(StageState::Subscribed).await;
        pipeline
    }

    async fn wait_all(&mut self, want: StageState) {
        for state in &mut self.states {
            tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == want))
                .await
                .expect("stage did not reach state in time")
                .expect("stage state sender dropped");
        }
    }

    async fn wait_for_slot(&self, slot: usize, want: LocationUpdate) {
        let known = self.known.clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            while known.get(slot) != Some(want) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("update did not reach the aggregator");
    }

    async fn stop(self) -> (RelayStats, RelayStats, AggregatorStats, String) {
        self.cancel.cancel();
        let ingest = self.ingest.await.unwrap();
        let forward = self.forward.await.unwrap();
        let (aggregator, out) = self.aggregator.await.unwrap();
        (ingest, forward, aggregator, String::from_utf8(out).unwrap())
    }
}

#[tokio::test]
async fn test_update_travels_all_hops() {
    let pipeline = Pipeline::start().await;

    pipeline.hub.publish("locations_raw", "2,10.5,20.5").unwrap();

    let expected = LocationUpdate::new(2, 10.5, 20.5);
    pipeline.wait_for_slot(2, expected).await;

    let snapshot = pipeline.known.snapshot();
    assert_eq!(snapshot.get(2), Some(expected));
    assert_eq!(snapshot.known(), 1);

    let (ingest, forward, aggregator, out) = pipeline.stop().await;
    assert_eq!(ingest.forwarded, 1);
    assert_eq!(forward.forwarded, 1);
    assert_eq!(aggregator.applied, 1);
    assert!(out.contains("  0 -> (no data yet)\n  1 -> (no data yet)\n  2,10.5,20.5\n"));
}

#[tokio::test]
async fn test_out_of_range_source_leaves_state_unchanged() {
    let pipeline = Pipeline::start().await;

    pipeline.hub.publish("locations_raw", "1,5,5").unwrap();
    pipeline.wait_for_slot(1, LocationUpdate::new(1, 5.0, 5.0)).await;
    let before = pipeline.known.snapshot();

    pipeline.hub.publish("locations_raw", "7,1.0,1.0").unwrap();
    pipeline.hub.publish("locations_raw", "bogus").unwrap();
    // Per-channel ordering: once this lands, the two above were handled
    pipeline.hub.publish("locations_raw", "3,0,0").unwrap();
    pipeline.wait_for_slot(3, LocationUpdate::new(3, 0.0, 0.0)).await;

    let after = pipeline.known.snapshot();
    for slot in [0, 1, 2, 4] {
        assert_eq!(after.slots()[slot], before.slots()[slot]);
    }

    let (_, _, aggregator, _) = pipeline.stop().await;
    assert_eq!(aggregator.out_of_range, 1);
    assert_eq!(aggregator.malformed, 1);
    assert_eq!(aggregator.applied, 2);
}

#[tokio::test]
async fn test_per_source_order_preserved() {
    let pipeline = Pipeline::start().await;
    let mut delivered = pipeline.hub.subscribe("locations_out").await.unwrap();

    let mut update = LocationUpdate::initial(0);
    let mut sent = Vec::new();
    for _ in 0..20 {
        let payload = update.encode();
        pipeline.hub.publish("locations_raw", &payload).unwrap();
        sent.push(payload);
        update = update.advanced(0.1);
    }

    let mut received = Vec::new();
    for _ in 0..sent.len() {
        let message = tokio::time::timeout(Duration::from_secs(5), delivered.next_message())
            .await
            .expect("forwarded payload did not arrive")
            .expect("subscription closed");
        received.push(message.payload);
    }
    assert_eq!(received, sent);

    let last = LocationUpdate::parse(&sent[sent.len() - 1]).unwrap();
    pipeline.wait_for_slot(0, last).await;

    let (ingest, forward, aggregator, out) = pipeline.stop().await;
    assert_eq!(ingest.forwarded, 20);
    assert_eq!(forward.forwarded, 20);
    assert_eq!(aggregator.applied, 20);

    // One table per update, in arrival order
    let rendered: Vec<&str> = out
        .lines()
        .filter(|line| line.starts_with("  0,"))
        .map(str::trim)
        .collect();
    assert_eq!(rendered, sent);
}

#[tokio::test]
async fn test_failed_forward_is_dropped_not_retried() {
    let pipeline = Pipeline::start().await;

    pipeline.hub.fail_next_publishes("locations_mid", 1);
    pipeline.hub.publish("locations_raw", "3,1,1").unwrap();
    pipeline.hub.publish("locations_raw", "4,2,2").unwrap();

    pipeline.wait_for_slot(4, LocationUpdate::new(4, 2.0, 2.0)).await;
    assert_eq!(pipeline.known.get(3), None);

    let (ingest, forward, aggregator, _) = pipeline.stop().await;
    assert_eq!(ingest.received, 2);
    assert_eq!(ingest.forwarded, 1);
    assert_eq!(ingest.failed, 1);
    assert_eq!(forward.received, 1);
    assert_eq!(aggregator.applied, 1);
}

#[tokio::test]
async fn test_recovers_after_broker_outage() {
    let mut pipeline = Pipeline::start().await;

    pipeline.hub.publish("locations_raw", "0,1,1").unwrap();
    pipeline.wait_for_slot(0, LocationUpdate::new(0, 1.0, 1.0)).await;

    pipeline.hub.set_available(false);
    pipeline.wait_all(StageState::Connecting).await;
    assert!(pipeline.hub.publish("locations_raw", "0,9,9").is_err());

    pipeline.hub.set_available(true);
    pipeline.wait_all(StageState::Subscribed).await;

    pipeline.hub.publish("locations_raw", "0,2,2").unwrap();
    pipeline.wait_for_slot(0, LocationUpdate::new(0, 2.0, 2.0)).await;

    let (ingest, forward, aggregator, _) = pipeline.stop().await;
    assert_eq!(ingest.reconnects, 1);
    assert_eq!(forward.reconnects, 1);
    assert_eq!(ingest.forwarded, 2);
    assert_eq!(aggregator.applied, 2);
}
