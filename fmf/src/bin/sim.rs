//! `fmf-sim`: the whole pipeline in one process

use clap::Parser;
use std::time::Duration;
use tracing::info;

use fmf::{parse_args, Runtime};
use fmf_cluster::pipeline::Simulator;

#[derive(Parser, Debug)]
#[command(name = "fmf-sim", version)]
#[command(about = "Run emitters, relays and the receiver in one process", long_about = None)]
struct Args {
    /// Stop after this many seconds instead of waiting for a signal
    #[arg(long, env = "FMF_SIM_DURATION_SECS")]
    duration_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = parse_args();
    let runtime = Runtime::start("sim")?;

    if let Some(secs) = args.duration_secs {
        let cancel = runtime.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!(duration_secs = secs, "Simulation time elapsed");
            cancel.cancel();
        });
    }

    let simulator = Simulator::new(runtime.service.clone(), runtime.config.clone());
    let report = simulator.run(std::io::stdout(), runtime.cancel.clone()).await;

    info!(
        node_id = %runtime.node_id,
        published = report.emitters.published,
        publish_failures = report.emitters.failed,
        ingest_forwarded = report.ingest.forwarded,
        forward_forwarded = report.forward.forwarded,
        applied = report.aggregator.applied,
        "Simulation report"
    );

    Ok(())
}
