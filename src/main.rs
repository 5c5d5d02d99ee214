//! rangekv server binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rangekv::{IndexKind, Server, ServerConfig, SkipListIndex, SnapshotIndex, SortedIndex};

#[derive(Parser, Debug)]
#[command(name = "rangekv")]
#[command(about = "Sorted in-memory key-value store with range scans")]
struct CliArgs {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:11211", env = "RANGEKV_LISTEN")]
    listen: SocketAddr,

    /// Index backend: skiplist or snapshot
    #[arg(long, default_value = "skiplist")]
    index: IndexKind,

    /// Longest accepted request line in bytes
    #[arg(long, default_value_t = 2048)]
    max_line_len: usize,

    /// Largest accepted value in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    max_value_size: usize,

    /// Seconds between stats log lines
    #[arg(long, default_value_t = 30)]
    stats_interval_secs: u64,
}

impl CliArgs {
    fn to_server_config(&self) -> ServerConfig {
        ServerConfig::new(self.listen)
            .index(self.index)
            .max_line_len(self.max_line_len)
            .max_value_size(self.max_value_size)
            .stats_interval(Duration::from_secs(self.stats_interval_secs.max(1)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    let config = args.to_server_config();
    tracing::info!("Starting with config: {:?}", config);

    match config.index {
        IndexKind::SkipList => serve(Arc::new(SkipListIndex::new()), config).await,
        IndexKind::Snapshot => serve(Arc::new(SnapshotIndex::new()), config).await,
    }
}

async fn serve<I: SortedIndex + 'static>(index: Arc<I>, config: ServerConfig) -> Result<()> {
    let server = Server::bind(index, config)
        .await
        .context("failed to start server")?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl-C");
                shutdown.shutdown();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    server.run().await.context("server failed")?;
    Ok(())
}
