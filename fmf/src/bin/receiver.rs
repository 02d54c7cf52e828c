//! `fmf-receiver`: print the latest position of every source

use clap::Parser;

use fmf::{parse_args, Runtime};
use fmf_cluster::pipeline::Aggregator;

#[derive(Parser, Debug)]
#[command(name = "fmf-receiver", version)]
#[command(about = "Track the latest location per source from locations_out", long_about = None)]
struct Args {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _args: Args = parse_args();
    let runtime = Runtime::start("receiver")?;

    let aggregator = Aggregator::from_config(runtime.service.clone(), &runtime.config);

    // Snapshots go to stdout, logs to stderr
    let mut stdout = std::io::stdout();
    aggregator.run(&mut stdout, runtime.cancel.clone()).await;

    Ok(())
}
