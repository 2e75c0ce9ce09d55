//! Helpdesk daemon entry point.

use anyhow::Result;
use clap::Parser;
use deskd::config::DeskConfig;
use deskd::server::{self, AppState};
use desk_common::TicketStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "deskd", version, about = "Helpdesk ticket daemon")]
struct Args {
    /// Config file path (default: /etc/deskd/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address override
    #[arg(long)]
    bind: Option<String>,

    /// Database path override
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = DeskConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db) = args.db {
        config.storage.db_path = db;
    }

    info!("deskd v{} starting", env!("CARGO_PKG_VERSION"));

    let store = TicketStore::open(&config.storage.db_path)?;
    let state = Arc::new(AppState::new(store, config));

    server::run(state).await
}
