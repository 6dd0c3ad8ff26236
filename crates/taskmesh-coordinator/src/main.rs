//! TaskMesh Coordinator Server

use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use taskmesh_coordinator::{Config, Server};
use taskmesh_core::Priority;

/// TaskMesh coordination service.
#[derive(Parser, Debug)]
#[command(name = "taskmesh-coordinator", about = "TaskMesh coordination service")]
struct Args {
    /// HTTP listen address
    #[arg(long, env = "TASKMESH_LISTEN", default_value = "0.0.0.0:7331")]
    listen: String,

    /// Accepted bearer tokens, comma separated. Empty disables auth.
    #[arg(long, env = "TASKMESH_TOKENS", value_delimiter = ',')]
    tokens: Vec<String>,

    /// Heartbeat interval handed to nodes, in seconds
    #[arg(long, env = "TASKMESH_HEARTBEAT_INTERVAL_SECS", default_value = "30")]
    heartbeat_interval_secs: u64,

    /// Seconds without a heartbeat before a node is marked offline
    #[arg(long, env = "TASKMESH_OFFLINE_THRESHOLD_SECS", default_value = "90")]
    offline_threshold_secs: u64,

    /// Seconds a claimed task may go unstarted before it is orphaned
    #[arg(long, env = "TASKMESH_CLAIM_TIMEOUT_SECS", default_value = "300")]
    claim_timeout_secs: u64,

    /// Priority for tasks created without one
    #[arg(long, env = "TASKMESH_DEFAULT_PRIORITY", default_value = "medium")]
    default_priority: Priority,

    /// Per-subscriber event buffer
    #[arg(long, env = "TASKMESH_EVENT_BUFFER", default_value = "100")]
    event_buffer: usize,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            listen_addr: self.listen,
            auth_tokens: self
                .tokens
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            offline_threshold: Duration::from_secs(self.offline_threshold_secs),
            claim_timeout: Duration::from_secs(self.claim_timeout_secs),
            default_priority: self.default_priority,
            event_buffer: self.event_buffer,
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = args.into_config();
    info!(
        listen = %config.listen_addr,
        offline_threshold_secs = config.offline_threshold.as_secs(),
        claim_timeout_secs = config.claim_timeout.as_secs(),
        "Starting TaskMesh coordinator"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
            info!("Received Ctrl-C");
            cancel.cancel();
        });
    }

    Server::new(config).start(cancel).await?;
    Ok(())
}
