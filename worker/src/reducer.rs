// worker/src/reducer.rs
//
// Reducer agent: un reduce task por (task_id, region). El shuffle es async
// (RPC a los mappers); cargar script, agrupar, reducir y guardar corre en un
// hilo de bloqueo.

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use common::{
    engine::reduce_groups,
    fs::FileStore,
    result_path,
    script::{ScriptError, ScriptRegistry},
    DataStatus, KeyValue, ReduceRequest, ReduceStatus, ReducingDoneRequest, TaskId,
};
use tracing::{debug, info, warn};

use crate::mapper::lock;
use crate::rpc::{CoordinatorClient, MapperClient};
use crate::staging::load_script;

type ReduceKey = (TaskId, u32);

#[derive(Debug, Clone, Copy)]
struct ReduceTaskState {
    status: ReduceStatus,
    run: u64,
}

#[derive(Clone)]
pub struct ReducerAgent {
    self_addr: Arc<String>,
    fs: Arc<dyn FileStore>,
    scripts: Arc<ScriptRegistry>,
    script_dir: Arc<PathBuf>,
    coordinator: Arc<dyn CoordinatorClient>,
    mappers: Arc<dyn MapperClient>,
    tasks: Arc<Mutex<HashMap<ReduceKey, ReduceTaskState>>>,
    runs: Arc<AtomicU64>,
}

impl ReducerAgent {
    pub fn new(
        self_addr: String,
        fs: Arc<dyn FileStore>,
        scripts: Arc<ScriptRegistry>,
        script_dir: PathBuf,
        coordinator: Arc<dyn CoordinatorClient>,
        mappers: Arc<dyn MapperClient>,
    ) -> Self {
        Self {
            self_addr: Arc::new(self_addr),
            fs,
            scripts,
            script_dir: Arc::new(script_dir),
            coordinator,
            mappers,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            runs: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registra el reduce task y lo arranca. Si ya hay uno en curso para la
    /// misma región no se lanza otro.
    pub fn reduce(&self, req: ReduceRequest) -> ReduceStatus {
        let key = (req.task_id.clone(), req.region);
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut tasks = lock(&self.tasks);
            if let Some(existing) = tasks.get(&key) {
                if existing.status.in_progress() {
                    debug!("reduce {:?} ya en curso ({:?})", key, existing.status);
                    return ReduceStatus::Accepted;
                }
            }
            tasks.insert(
                key,
                ReduceTaskState {
                    status: ReduceStatus::Accepted,
                    run,
                },
            );
        }

        info!(
            "reduce task aceptado: task={} region={} mappers={:?}",
            req.task_id, req.region, req.mappers
        );

        let agent = self.clone();
        tokio::spawn(async move {
            agent.run_reduce(req, run).await;
        });
        ReduceStatus::Accepted
    }

    pub fn status(&self, task_id: &str, region: u32) -> ReduceStatus {
        lock(&self.tasks)
            .get(&(task_id.to_string(), region))
            .map(|s| s.status)
            .unwrap_or(ReduceStatus::ReduceNotFound)
    }

    fn set_status(&self, key: &ReduceKey, run: u64, status: ReduceStatus) {
        if let Some(state) = lock(&self.tasks).get_mut(key) {
            if state.run == run {
                state.status = status;
            }
        }
    }

    async fn run_reduce(self, req: ReduceRequest, run: u64) {
        let key = (req.task_id.clone(), req.region);

        // 1) shuffle
        self.set_status(&key, run, ReduceStatus::StartDataLoading);
        let tuples = match self.shuffle(&req).await {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    "shuffle de region {} del task {} falló: {:#}",
                    req.region, req.task_id, e
                );
                self.set_status(&key, run, ReduceStatus::ErrDataLoading);
                return;
            }
        };
        debug!("region {}: {} tuplas recibidas", req.region, tuples.len());
        self.set_status(&key, run, ReduceStatus::DataLoaded);

        // 2..5) script, grupos, reduce y guardado
        let agent = self.clone();
        let job = req.clone();
        let status = match tokio::task::spawn_blocking(move || agent.reduce_pipeline(&job, run, tuples)).await {
            Ok(status) => status,
            Err(e) => {
                warn!("panic o join error en reduce de region {}: {:?}", req.region, e);
                ReduceStatus::ErrReduceScript
            }
        };
        if status != ReduceStatus::DataSaved {
            warn!(
                "reduce task {} / region {} terminó con {:?}",
                req.task_id, req.region, status
            );
            self.set_status(&key, run, status);
            return;
        }
        self.set_status(&key, run, status);

        // 6) aviso al master
        let done = ReducingDoneRequest {
            worker_addr: self.self_addr.to_string(),
            task_id: req.task_id.clone(),
            region: req.region,
        };
        match self.coordinator.reducing_done(&done).await {
            Ok(()) => {
                info!("region {} del task {} reducida", req.region, req.task_id);
                self.set_status(&key, run, ReduceStatus::Finished);
            }
            Err(e) => {
                warn!("no se pudo avisar reducing_done de region {}: {:#}", req.region, e);
                self.set_status(&key, run, ReduceStatus::ErrSendDone);
            }
        }
    }

    /// Junta la región desde cada mapper, en el orden de la lista.
    async fn shuffle(&self, req: &ReduceRequest) -> anyhow::Result<Vec<KeyValue>> {
        let mut tuples = Vec::new();
        for mapper in &req.mappers {
            let mapped = self
                .mappers
                .read_mapped_data(mapper, &req.task_id, req.region)
                .await?;
            match mapped.status {
                DataStatus::Ok => tuples.extend(mapped.data),
                DataStatus::NotFound => debug!("{} no tiene datos del task {}", mapper, req.task_id),
            }
        }
        Ok(tuples)
    }

    fn reduce_pipeline(&self, req: &ReduceRequest, run: u64, tuples: Vec<KeyValue>) -> ReduceStatus {
        let key = (req.task_id.clone(), req.region);

        let program = match load_script(
            &self.scripts,
            self.fs.as_ref(),
            &self.script_dir,
            &req.task_id,
            &format!("reduce-{}-{}", req.region, run),
            &req.script_path,
        ) {
            Ok(p) => p,
            Err(ScriptError::NotFound(path)) => {
                warn!("script de reduce no encontrado: {}", path);
                return ReduceStatus::ReduceScriptNotFound;
            }
            Err(e) => {
                warn!("error cargando script de reduce {}: {}", req.script_path, e);
                return ReduceStatus::ErrReducerLoading;
            }
        };
        self.set_status(&key, run, ReduceStatus::ReducerLoaded);

        let reducer = program.reducer.clone();
        let output = match catch_unwind(AssertUnwindSafe(|| reduce_groups(reducer.as_ref(), tuples))) {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                warn!("el reduce de {} falló en region {}: {:#}", program.name, req.region, e);
                return ReduceStatus::ErrReduceScript;
            }
            Err(_) => {
                warn!("el reduce de {} hizo panic en region {}", program.name, req.region);
                return ReduceStatus::ErrReduceScript;
            }
        };
        self.set_status(&key, run, ReduceStatus::DataReduced);

        let bytes = match serde_json::to_vec(&output) {
            Ok(b) => b,
            Err(e) => {
                warn!("no se pudo serializar el resultado de region {}: {}", req.region, e);
                return ReduceStatus::ErrSaveResult;
            }
        };
        let path = result_path(&req.task_id, req.region);
        if let Err(e) = self.fs.save(&bytes, &path) {
            warn!("no se pudo guardar {}: {}", path, e);
            return ReduceStatus::ErrSaveResult;
        }
        debug!("resultado de region {} en {}", req.region, path);

        ReduceStatus::DataSaved
    }
}
