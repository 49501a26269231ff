use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use duel_2048::clock::SystemClock;
use duel_2048::config::{ConfigLoader, ServerConfig};
use duel_2048::records::{JsonlRecords, MemoryRecords, RecordSink};
use duel_2048::server::{self, Services};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "serve", about = "Serve 2048 sessions and rooms over line-delimited JSON")]
struct Args {
    /// Config file (TOML); falls back to $DUEL_2048_CONFIG, then ./duel-2048.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(long)]
    listen: Option<String>,

    /// Override the JSON Lines record log
    #[arg(long)]
    records: Option<PathBuf>,

    /// Override the agent search depth
    #[arg(long)]
    depth: Option<u32>,
}

async fn run<S: RecordSink + 'static>(cfg: ServerConfig, sink: S) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&cfg.listen)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.listen))?;
    tracing::info!(addr = %listener.local_addr()?, depth = cfg.agent.depth, "listening");
    let services = Arc::new(Services::new(sink, Arc::new(SystemClock), cfg.agent));
    server::serve(listener, services).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut cfg = ConfigLoader::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        cfg.listen = listen;
    }
    if let Some(records) = args.records {
        cfg.records_path = Some(records);
    }
    if let Some(depth) = args.depth {
        cfg.agent.depth = depth;
    }

    match cfg.records_path.clone() {
        Some(path) => {
            let sink = JsonlRecords::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
            run(cfg, sink).await
        }
        None => {
            tracing::warn!("no records_path configured, records are kept in memory");
            run(cfg, MemoryRecords::new()).await
        }
    }
}
