use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fmf_cluster::sync::{service_from_config, ChannelService};
use fmf_core::bootstrap::load_config;
use fmf_core::config::BrokerKind;
use fmf_core::logging;
use fmf_core::models::generate_node_id;
use fmf_core::Config;

/// Everything a component needs once the process is up
pub struct Runtime {
    pub node_id: String,
    pub config: Config,
    pub service: Arc<dyn ChannelService>,
    pub cancel: CancellationToken,
}

impl Runtime {
    /// Load configuration, start logging, build the channel service and
    /// install the shutdown listener.
    ///
    /// Errors here are startup failures and end the process with status 1.
    pub fn start(role: &str) -> anyhow::Result<Self> {
        // 1. Load and validate configuration
        let config = load_config()?;

        // 2. Initialize logging
        logging::init_logging(&config.logging)?;

        let node_id = generate_node_id(role);
        info!(
            node_id = %node_id,
            broker = ?config.broker.kind,
            version = env!("CARGO_PKG_VERSION"),
            "Starting {role}"
        );

        if config.broker.kind == BrokerKind::Memory && role != "sim" {
            warn!(role = role, "In-memory broker selected; no other process can reach this one");
        }

        // 3. Channel service (does not connect yet)
        let service = service_from_config(&config.broker)?;

        // 4. Shutdown on SIGINT/SIGTERM
        let cancel = spawn_shutdown_listener();

        Ok(Self {
            node_id,
            config,
            service,
            cancel,
        })
    }
}

/// Spawn a task that cancels the returned token on the first shutdown signal
pub fn spawn_shutdown_listener() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping");
        token.cancel();
    });
    cancel
}

/// Wait for Ctrl+C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
