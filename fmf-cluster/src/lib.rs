pub mod pipeline;
pub mod sync;

pub use pipeline::{
    Aggregator, AggregatorStats, EmitterStats, KnownState, LatestPosition, RelayStage,
    RelayStageConfig, RelayStats, SimulationReport, Simulator, Snapshot, SourceEmitter,
    SourceEmitterConfig,
};
pub use sync::{
    service_from_config, ChannelMessage, ChannelService, MemoryChannelService, Publisher,
    RedisChannelService, StageState, Subscriber,
};
