//! `fmf-client <source_id>`: publish one source's drifting position

use clap::Parser;

use fmf::{parse_args, Runtime};
use fmf_cluster::pipeline::{SourceEmitter, SourceEmitterConfig};

#[derive(Parser, Debug)]
#[command(name = "fmf-client", version)]
#[command(about = "Publish a simulated location every period", long_about = None)]
struct Args {
    /// Source id; the receiver tracks ids 0..population
    #[arg(allow_negative_numbers = true)]
    source_id: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = parse_args();
    let runtime = Runtime::start("client")?;

    let emitter = SourceEmitter::new(
        runtime.service.clone(),
        SourceEmitterConfig::from_config(args.source_id, &runtime.config),
    );
    emitter.run(runtime.cancel.clone()).await;

    Ok(())
}
