use std::{sync::Arc, time::Duration};

use common::WorkerHeartbeatRequest;
use sysinfo::{CpuExt, System, SystemExt};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::rpc::CoordinatorClient;

/// Lee CPU y memoria para el próximo heartbeat.
fn sample(sys: &mut System, worker_addr: &str) -> WorkerHeartbeatRequest {
    sys.refresh_cpu();
    sys.refresh_memory();

    WorkerHeartbeatRequest {
        worker_addr: worker_addr.to_string(),
        cpu_percent: Some(sys.global_cpu_info().cpu_usage()),
        mem_bytes: Some(sys.used_memory()),
    }
}

/// Heartbeat periódico al master. El primero que llega hace de registro.
pub async fn heartbeat_loop(coordinator: Arc<dyn CoordinatorClient>, worker_addr: String, interval: Duration) {
    let mut sys = System::new_all();
    let mut connected = false;

    loop {
        let req = sample(&mut sys, &worker_addr);
        match coordinator.heartbeat(&req).await {
            Ok(()) => {
                if !connected {
                    info!("worker {} conectado al master", worker_addr);
                    connected = true;
                }
            }
            Err(e) => {
                if connected {
                    warn!("heartbeat falló, master inaccesible: {:#}", e);
                } else {
                    debug!("master todavía no responde: {:#}", e);
                }
                connected = false;
            }
        }
        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_incluye_metricas() {
        let mut sys = System::new();
        let req = sample(&mut sys, "http://w1:9090");
        assert_eq!(req.worker_addr, "http://w1:9090");
        assert!(req.cpu_percent.is_some());
        assert!(req.mem_bytes.is_some());
    }
}
