use common::config::{env_millis, env_string};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// URL base del master, ej: http://master:8080
    pub master_url: String,
    pub bind: String,
    /// Dirección que anunciamos al master y a los otros workers
    pub addr: String,
    /// Raíz del intermediate store
    pub work_dir: PathBuf,
    pub script_dir: PathBuf,
    pub fs_root: PathBuf,
    pub heartbeat_interval: Duration,
    pub rpc_timeout: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let bind = env_string("WORKER_BIND", "0.0.0.0:9090");

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "localhost".to_string());
        let default_addr = format!("http://{}:{}", host, port_of(&bind));

        Self {
            master_url: env_string("MASTER_URL", "http://localhost:8080"),
            addr: env_string("WORKER_ADDR", &default_addr),
            bind,
            work_dir: PathBuf::from(env_string("WORK_DIR", "/data/work")),
            script_dir: PathBuf::from(env_string("SCRIPT_DIR", "/data/scripts")),
            fs_root: PathBuf::from(env_string("FS_ROOT", "/data/fs")),
            heartbeat_interval: env_millis("HEARTBEAT_INTERVAL_MS", 500),
            rpc_timeout: env_millis("RPC_TIMEOUT_MS", 5000),
        }
    }
}

fn port_of(bind: &str) -> &str {
    bind.rsplit_once(':').map(|(_, p)| p).unwrap_or("9090")
}
