//! docket-worker: runs listeners, the cron scheduler, the hung-job sweeper
//! and the autoscaler against in-memory clients.

mod shutdown;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use docket_core::app::{AppBuilder, Clients};
use docket_core::config::DocketConfig;

#[derive(Debug, Parser)]
#[command(name = "docket-worker")]
#[command(version)]
#[command(about = "Distributed task and work-queue coordination worker")]
struct Args {
    /// YAML configuration file. Defaults apply when omitted.
    #[arg(long, env = "DOCKET_CONFIG")]
    config: Option<PathBuf>,

    /// Identity recorded on claims, heartbeats and locks.
    #[arg(long, env = "DOCKET_WORKER_ID", default_value = "docket-worker-1")]
    worker_id: String,

    /// Listen loops started before the autoscaler takes over.
    #[arg(long, env = "DOCKET_LISTENERS", default_value_t = 2)]
    listeners: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => DocketConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => DocketConfig::default(),
    };

    let collections: Vec<&str> = config.work_queues.iter().map(|q| q.collection.as_str()).collect();
    let clients = Clients::in_memory(&collections, config.listener.visibility_timeout());

    let app = AppBuilder::new(config, args.worker_id.as_str(), clients)
        .build()
        .context("building app")?;
    let running = app.start(args.listeners).await.context("starting app")?;

    let shutdown = shutdown::install_shutdown_handler();
    shutdown.cancelled().await;

    let counts = running.queue().counts().await.context("reading queue counts")?;
    info!(?counts, "draining");
    let audit_records = running.shutdown().await;
    info!(audit_records, "worker stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from(["docket-worker", "--worker-id", "node-7", "--listeners", "4"]).unwrap();
        assert_eq!(args.worker_id, "node-7");
        assert_eq!(args.listeners, 4);
    }
}
