use std::time::Instant;

use tokio::time::sleep;
use tracing::{debug, info};

use crate::tracker::JobTracker;

/// Loop de liveness: cada `monitor_interval` desaloja a los workers sin
/// heartbeat y les saca el trabajo pendiente.
pub async fn monitor_workers(tracker: JobTracker) {
    let interval = tracker.config().monitor_interval;
    info!(
        "monitor de workers cada {:?} (timeout {:?})",
        interval,
        tracker.config().heartbeat_timeout
    );

    loop {
        sleep(interval).await;

        let evicted = tracker.sweep(Instant::now());
        if !evicted.is_empty() {
            debug!("workers desalojados en esta pasada: {:?}", evicted);
        }
    }
}
