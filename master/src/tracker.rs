// master/src/tracker.rs
//
// Job tracker: máquina de estados de tasks/chunks/regiones y los loops de
// scheduling de map y reduce.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Instant,
};

use chrono::Utc;
use common::{
    fs::{FileStore, FsError},
    result_dir, result_path, MapRequest, MapStatus, ReduceRequest, Region, TaskId, TaskInfo,
    TaskResults, TaskStatus, WorkerAddr, WorkerMetrics,
};
use thiserror::Error;
use tokio::{sync::Notify, time::sleep};
use tracing::{debug, info, warn};

use crate::config::MasterConfig;
use crate::dispatch::WorkerClient;
use crate::state::{lock, TaskEntry, WorkerRegistry};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("no encontrado: {0}")]
    NotFound(String),
    #[error("no hay workers registrados")]
    NoWorkers,
    #[error(transparent)]
    Fs(#[from] FsError),
}

#[derive(Clone)]
pub struct JobTracker {
    config: Arc<MasterConfig>,
    workers: Arc<WorkerRegistry>,
    tasks: Arc<Mutex<HashMap<TaskId, TaskEntry>>>,
    client: Arc<dyn WorkerClient>,
    fs: Arc<dyn FileStore>,
    // despierta a los loops ante registros, "done" y desalojos
    wakeup: Arc<Notify>,
}

enum MapStep {
    Dispatch(WorkerAddr, MapRequest),
    Wait,
    Stop,
}

impl JobTracker {
    pub fn new(config: MasterConfig, client: Arc<dyn WorkerClient>, fs: Arc<dyn FileStore>) -> Self {
        Self {
            config: Arc::new(config),
            workers: Arc::new(WorkerRegistry::new()),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            client,
            fs,
            wakeup: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /* ---------------- API ---------------- */

    /// Crea un task y arranca su loop de map.
    ///
    /// `reduce_count` queda fijo en la cantidad de workers registrados ahora.
    pub fn create_task(&self, input: &str, script: &str) -> Result<TaskId, TrackerError> {
        let chunk_paths = self.fs.path_status(input).map_err(|e| {
            if e.is_not_found() {
                TrackerError::NotFound(input.to_string())
            } else {
                TrackerError::Fs(e)
            }
        })?;

        let reduce_count = self.workers.len() as u32;
        if reduce_count == 0 {
            return Err(TrackerError::NoWorkers);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let mut entry = TaskEntry::new(id.clone(), input, script, chunk_paths, reduce_count);
        entry.status = TaskStatus::Mapping;

        info!(
            "task {} creado: input={} script={} chunks={} reduce_count={}",
            id,
            input,
            script,
            entry.chunks.len(),
            reduce_count
        );

        lock(&self.tasks).insert(id.clone(), entry);

        let tracker = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            tracker.run_map_loop(task_id).await;
        });

        Ok(id)
    }

    /// Heartbeat de un worker. Los nuevos quedan registrados y libres.
    pub fn heartbeat(&self, addr: &str, cpu_percent: Option<f32>, mem_bytes: Option<u64>) {
        if self.workers.heartbeat(addr, cpu_percent, mem_bytes) {
            info!("nuevo worker registrado: {}", addr);
            self.wakeup.notify_waiters();
        } else {
            debug!("heartbeat de {}", addr);
        }
    }

    pub fn mapping_done(&self, addr: &str, task_id: &str, chunk_path: &str) -> Result<(), TrackerError> {
        let finished_mapping = {
            let mut tasks = lock(&self.tasks);
            let task = tasks
                .get_mut(task_id)
                .ok_or_else(|| TrackerError::NotFound(task_id.to_string()))?;

            if task.status != TaskStatus::Mapping {
                warn!(
                    "mapping_done tardío de {} para task {} en estado {:?}, ignorado",
                    addr, task_id, task.status
                );
                return Ok(());
            }

            let chunk = task
                .chunks
                .iter_mut()
                .find(|c| c.chunk_path == chunk_path)
                .ok_or_else(|| TrackerError::NotFound(chunk_path.to_string()))?;

            if chunk.worker.as_deref() != Some(addr) {
                warn!(
                    "mapping_done de {} para chunk {} asignado a {:?}, ignorado",
                    addr, chunk_path, chunk.worker
                );
                return Ok(());
            }

            chunk.status = MapStatus::MapApplied;
            info!("chunk {} del task {} mapeado por {}", chunk_path, task_id, addr);

            if task.all_mapped() {
                task.status = TaskStatus::MappingDone;
                true
            } else {
                false
            }
        };

        self.workers.push_free(addr);

        if finished_mapping {
            info!("task {}: map terminado, arrancando reduce", task_id);
            let tracker = self.clone();
            let task_id = task_id.to_string();
            tokio::spawn(async move {
                tracker.run_reduce_loop(task_id).await;
            });
        }

        self.wakeup.notify_waiters();
        Ok(())
    }

    pub fn reducing_done(&self, addr: &str, task_id: &str, region: u32) -> Result<(), TrackerError> {
        {
            let mut tasks = lock(&self.tasks);
            let task = tasks
                .get_mut(task_id)
                .ok_or_else(|| TrackerError::NotFound(task_id.to_string()))?;

            if region == 0 || region > task.reduce_count {
                return Err(TrackerError::NotFound(format!("{}/region {}", task_id, region)));
            }

            match task.regions.remove(&region) {
                Some(r) => {
                    if r.worker != addr {
                        warn!(
                            "region {} del task {} terminada por {} (asignada a {})",
                            region, task_id, addr, r.worker
                        );
                    }
                    info!("region {} del task {} reducida por {}", region, task_id, addr);
                }
                None => {
                    debug!("reducing_done repetido para region {} del task {}", region, task_id);
                }
            }

            if task.status == TaskStatus::Reducing && task.regions.is_empty() {
                task.status = TaskStatus::TaskDone;
                task.finished_at = Some(Utc::now());
                info!("task {} terminado", task_id);
            }
        }

        self.workers.push_free(addr);
        self.wakeup.notify_waiters();
        Ok(())
    }

    pub fn get_status(&self, task_id: &str) -> Result<TaskInfo, TrackerError> {
        lock(&self.tasks)
            .get(task_id)
            .map(|t| t.info())
            .ok_or_else(|| TrackerError::NotFound(task_id.to_string()))
    }

    /// Rutas de resultado; vacío mientras el task no terminó.
    pub fn get_result(&self, task_id: &str) -> Result<TaskResults, TrackerError> {
        let (status, reduce_count) = {
            let tasks = lock(&self.tasks);
            let task = tasks
                .get(task_id)
                .ok_or_else(|| TrackerError::NotFound(task_id.to_string()))?;
            (task.status, task.reduce_count)
        };

        if !status.is_done() {
            return Ok(TaskResults {
                task_id: task_id.to_string(),
                status,
                paths: Vec::new(),
            });
        }

        let dir = result_dir(task_id);
        let paths = match self.fs.list_dir(&dir) {
            Ok(names) => names.into_iter().map(|n| format!("{}/{}", dir, n)).collect(),
            Err(e) => {
                warn!("no se pudo listar {}: {}", dir, e);
                (1..=reduce_count).map(|r| result_path(task_id, r)).collect()
            }
        };

        Ok(TaskResults {
            task_id: task_id.to_string(),
            status,
            paths,
        })
    }

    pub fn list_workers(&self) -> Vec<WorkerMetrics> {
        self.workers.metrics(Instant::now())
    }

    /* ---------------- liveness ---------------- */

    /// Desaloja workers vencidos y devuelve su trabajo pendiente al scheduler.
    pub fn sweep(&self, now: Instant) -> Vec<WorkerAddr> {
        let evicted = self.workers.evict_stale(now, self.config.heartbeat_timeout);
        if evicted.is_empty() {
            return evicted;
        }

        for w in &evicted {
            warn!("worker {} sin heartbeat, desalojado", w);
        }

        {
            let mut tasks = lock(&self.tasks);
            for task in tasks.values_mut() {
                match task.status {
                    TaskStatus::Mapping => {
                        for chunk in task.chunks.iter_mut() {
                            let owned = chunk
                                .worker
                                .as_ref()
                                .map(|w| evicted.contains(w))
                                .unwrap_or(false);
                            if owned {
                                info!(
                                    "task {}: chunk {} vuelve a accepted (worker {:?} caído)",
                                    task.id, chunk.chunk_path, chunk.worker
                                );
                                chunk.status = MapStatus::Accepted;
                                chunk.worker = None;
                                chunk.attempts += 1;
                            }
                        }
                    }
                    TaskStatus::Reducing => {
                        for region in task.regions.values_mut() {
                            if evicted.contains(&region.worker) {
                                info!(
                                    "task {}: region {} pendiente de reasignar (worker {} caído)",
                                    task.id, region.number, region.worker
                                );
                                region.dispatched = false;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        self.wakeup.notify_waiters();
        evicted
    }

    /* ---------------- loops de scheduling ---------------- */

    async fn wait(&self) {
        tokio::select! {
            _ = self.wakeup.notified() => {}
            _ = sleep(self.config.scheduler_poll) => {}
        }
    }

    async fn run_map_loop(self, task_id: TaskId) {
        debug!("loop de map del task {} iniciado", task_id);
        loop {
            match self.next_map_step(&task_id) {
                MapStep::Dispatch(worker, req) => self.dispatch_map(worker, req),
                MapStep::Wait => self.wait().await,
                MapStep::Stop => break,
            }
        }
        debug!("loop de map del task {} terminado", task_id);
    }

    fn next_map_step(&self, task_id: &str) -> MapStep {
        let mut tasks = lock(&self.tasks);
        let Some(task) = tasks.get_mut(task_id) else {
            return MapStep::Stop;
        };
        if task.status != TaskStatus::Mapping {
            return MapStep::Stop;
        }

        let Some(idx) = task.next_accepted_chunk() else {
            return MapStep::Wait;
        };
        let Some(worker) = self.workers.pop_free() else {
            return MapStep::Wait;
        };

        let chunk = &mut task.chunks[idx];
        chunk.status = MapStatus::ChunkLoaded;
        chunk.worker = Some(worker.clone());

        let req = MapRequest {
            task_id: task.id.clone(),
            reduce_count: task.reduce_count,
            chunk_path: chunk.chunk_path.clone(),
            script_path: task.script.clone(),
            restart: chunk.attempts > 0,
        };
        MapStep::Dispatch(worker, req)
    }

    fn dispatch_map(&self, worker: WorkerAddr, req: MapRequest) {
        info!(
            "task {}: chunk {} -> {} (restart={})",
            req.task_id, req.chunk_path, worker, req.restart
        );
        let client = self.client.clone();
        tokio::spawn(async move {
            match client.map(&worker, &req).await {
                Ok(resp) => debug!("map en {}: {:?}", worker, resp.status),
                Err(e) => warn!("error despachando map de {} a {}: {:#}", req.chunk_path, worker, e),
            }
        });
    }

    async fn run_reduce_loop(self, task_id: TaskId) {
        // fase 1: armar las regiones cuando haya workers vivos
        loop {
            let alive = self.workers.alive();
            if alive.is_empty() {
                debug!("task {}: esperando workers para el reduce", task_id);
                self.wait().await;
                continue;
            }

            let mut tasks = lock(&self.tasks);
            let Some(task) = tasks.get_mut(&task_id) else {
                return;
            };
            if task.status != TaskStatus::MappingDone {
                return;
            }

            let mappers = task.mappers();
            task.regions = (1..=task.reduce_count)
                .map(|number| {
                    let worker = alive[(number as usize - 1) % alive.len()].clone();
                    (
                        number,
                        Region {
                            number,
                            mappers: mappers.clone(),
                            worker,
                            dispatched: false,
                        },
                    )
                })
                .collect();
            task.status = TaskStatus::Reducing;
            info!(
                "task {}: {} regiones sobre {} workers, mappers={:?}",
                task_id,
                task.reduce_count,
                alive.len(),
                mappers
            );
            break;
        }

        // fase 2: despachar regiones a su worker cuando esté libre
        loop {
            let batch = {
                let alive = self.workers.alive();
                let mut tasks = lock(&self.tasks);
                let Some(task) = tasks.get_mut(&task_id) else {
                    return;
                };
                if task.status.is_done() {
                    break;
                }

                let mut batch: Vec<(WorkerAddr, ReduceRequest)> = Vec::new();
                for region in task.regions.values_mut() {
                    if region.dispatched {
                        continue;
                    }
                    if !self.workers.is_alive(&region.worker) {
                        if alive.is_empty() {
                            continue;
                        }
                        let worker = alive[(region.number as usize - 1) % alive.len()].clone();
                        info!(
                            "task {}: region {} reasignada de {} a {}",
                            task_id, region.number, region.worker, worker
                        );
                        region.worker = worker;
                    }
                    if self.workers.take_if_free(&region.worker) {
                        region.dispatched = true;
                        batch.push((
                            region.worker.clone(),
                            ReduceRequest {
                                task_id: task.id.clone(),
                                region: region.number,
                                mappers: region.mappers.clone(),
                                script_path: task.script.clone(),
                            },
                        ));
                    }
                }
                batch
            };

            for (worker, req) in batch {
                self.dispatch_reduce(worker, req);
            }
            self.wait().await;
        }
        debug!("loop de reduce del task {} terminado", task_id);
    }

    fn dispatch_reduce(&self, worker: WorkerAddr, req: ReduceRequest) {
        info!("task {}: region {} -> {}", req.task_id, req.region, worker);
        let client = self.client.clone();
        tokio::spawn(async move {
            match client.reduce(&worker, &req).await {
                Ok(resp) => debug!("reduce en {}: {:?}", worker, resp.status),
                Err(e) => warn!("error despachando reduce region {} a {}: {:#}", req.region, worker, e),
            }
        });
    }
}
