use common::config::{env_millis, env_string};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub bind: String,
    /// Raíz del file store local (volumen compartido)
    pub fs_root: PathBuf,
    pub heartbeat_timeout: Duration,
    pub monitor_interval: Duration,
    /// Cota superior de espera de los loops de scheduling
    pub scheduler_poll: Duration,
    pub rpc_timeout: Duration,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            fs_root: PathBuf::from("/data/fs"),
            heartbeat_timeout: Duration::from_secs(2),
            monitor_interval: Duration::from_secs(1),
            scheduler_poll: Duration::from_millis(500),
            rpc_timeout: Duration::from_secs(5),
        }
    }
}

impl MasterConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            bind: env_string("MASTER_BIND", &d.bind),
            fs_root: PathBuf::from(env_string("FS_ROOT", &d.fs_root.to_string_lossy())),
            heartbeat_timeout: env_millis("HEARTBEAT_TIMEOUT_MS", d.heartbeat_timeout.as_millis() as u64),
            monitor_interval: env_millis("MONITOR_INTERVAL_MS", d.monitor_interval.as_millis() as u64),
            scheduler_poll: env_millis("SCHEDULER_POLL_MS", d.scheduler_poll.as_millis() as u64),
            rpc_timeout: env_millis("RPC_TIMEOUT_MS", d.rpc_timeout.as_millis() as u64),
        }
    }
}
