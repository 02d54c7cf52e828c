//! Location relay pipeline
//!
//! ```text
//! emitter -> locations_raw -> ingest -> locations_mid -> forward -> locations_out -> aggregator
//! ```

pub mod aggregator;
pub mod emitter;
pub mod relay;
pub mod simulator;

pub use aggregator::{
    AggregateOutcome, Aggregator, AggregatorStats, ApplyOutcome, KnownState, LatestPosition,
    Snapshot, DEFAULT_POPULATION,
};
pub use emitter::{EmitterStats, SourceEmitter, SourceEmitterConfig};
pub use relay::{ForwardOutcome, Forwarder, RelayStage, RelayStageConfig, RelayStats};
pub use simulator::{SimulationReport, Simulator};
