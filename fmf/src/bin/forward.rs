//! `fmf-forward`: locations_mid to locations_out

use clap::Parser;

use fmf::{parse_args, Runtime};
use fmf_cluster::pipeline::{RelayStage, RelayStageConfig};

#[derive(Parser, Debug)]
#[command(name = "fmf-forward", version)]
#[command(about = "Relay locations_mid to locations_out", long_about = None)]
struct Args {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _args: Args = parse_args();
    let runtime = Runtime::start("forward")?;

    let stage = RelayStage::new(runtime.service.clone(), RelayStageConfig::forward(&runtime.config));
    stage.run(runtime.cancel.clone()).await;

    Ok(())
}
