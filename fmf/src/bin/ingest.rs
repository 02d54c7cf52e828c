//! `fmf-ingest`: locations_raw to locations_mid

use clap::Parser;

use fmf::{parse_args, Runtime};
use fmf_cluster::pipeline::{RelayStage, RelayStageConfig};

#[derive(Parser, Debug)]
#[command(name = "fmf-ingest", version)]
#[command(about = "Relay locations_raw to locations_mid", long_about = None)]
struct Args {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _args: Args = parse_args();
    let runtime = Runtime::start("ingest")?;

    let stage = RelayStage::new(runtime.service.clone(), RelayStageConfig::ingest(&runtime.config));
    stage.run(runtime.cancel.clone()).await;

    Ok(())
}
