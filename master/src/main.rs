mod config;
mod dispatch;
mod handlers;
mod monitor;
mod state;
mod tracker;

use std::sync::Arc;

use common::fs::LocalFs;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::MasterConfig;
use crate::dispatch::HttpWorkerClient;
use crate::tracker::JobTracker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("master=debug,tower_http=info")),
        )
        .init();

    let config = MasterConfig::from_env();
    info!("configuración: {:?}", config);

    let fs = Arc::new(LocalFs::new(&config.fs_root));
    let client = Arc::new(HttpWorkerClient::new(config.rpc_timeout)?);
    let tracker = JobTracker::new(config.clone(), client, fs);

    // monitor de heartbeats en segundo plano
    let monitor_tracker = tracker.clone();
    tokio::spawn(async move {
        monitor::monitor_workers(monitor_tracker).await;
    });

    // router HTTP
    let app = handlers::build_router(tracker);

    let listener = TcpListener::bind(&config.bind).await?;
    info!("master escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
