use anyhow::Result;
use common::{
    fs::{FileStore, LocalFs},
    script::ScriptRegistry,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::WorkerConfig;
use crate::handlers::{self, WorkerState};
use crate::heartbeat;
use crate::mapper::MapperAgent;
use crate::reducer::ReducerAgent;
use crate::rpc::{self, CoordinatorClient, HttpCoordinatorClient, HttpMapperClient};
use crate::store::IntermediateStore;

/// Arranque del worker:
/// - arma mapper/reducer sobre el file store y el intermediate store
/// - lanza el heartbeat al master (que también lo registra)
/// - sirve la API HTTP que usan el master y los otros workers
pub async fn run() -> Result<()> {
    let config = WorkerConfig::from_env();
    info!("configuración: {:?}", config);

    let http = rpc::http_client(config.rpc_timeout)?;
    let coordinator: Arc<dyn CoordinatorClient> =
        Arc::new(HttpCoordinatorClient::new(http.clone(), &config.master_url));

    let fs: Arc<dyn FileStore> = Arc::new(LocalFs::new(&config.fs_root));
    let scripts = Arc::new(ScriptRegistry::with_builtin());
    info!("programas disponibles: {:?}", scripts.names());

    let mapper = MapperAgent::new(
        config.addr.clone(),
        fs.clone(),
        scripts.clone(),
        Arc::new(IntermediateStore::new(&config.work_dir)),
        config.script_dir.clone(),
        coordinator.clone(),
    );
    let reducer = ReducerAgent::new(
        config.addr.clone(),
        fs,
        scripts,
        config.script_dir.clone(),
        coordinator.clone(),
        Arc::new(HttpMapperClient::new(http)),
    );

    let hb_addr = config.addr.clone();
    let interval = config.heartbeat_interval;
    tokio::spawn(async move {
        heartbeat::heartbeat_loop(coordinator, hb_addr, interval).await;
    });

    let app = handlers::build_router(WorkerState { mapper, reducer });

    let listener = TcpListener::bind(&config.bind).await?;
    info!(
        "worker {} escuchando en {} (master {})",
        config.addr,
        listener.local_addr()?,
        config.master_url
    );

    axum::serve(listener, app).await?;
    Ok(())
}
