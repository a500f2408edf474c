// worker/src/mapper.rs
//
// Mapper agent: un map task por (task_id, chunk). El pipeline corre en un
// hilo de bloqueo y cada etapa que falla deja un estado terminal.

use std::{
    collections::BTreeMap,
    panic::{catch_unwind, AssertUnwindSafe},
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use common::{
    fs::FileStore,
    partitioner::partition_tuples,
    script::{ScriptError, ScriptRegistry},
    DataStatus, MapAck, MapRequest, MapStatus, MappedData, MappingDoneRequest, TaskId,
};
use tracing::{debug, info, warn};

use crate::rpc::CoordinatorClient;
use crate::staging::load_script;
use crate::store::IntermediateStore;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

type MapKey = (TaskId, String);

#[derive(Debug, Clone, Copy)]
struct MapTaskState {
    status: MapStatus,
    // ejecución dueña del registro; las viejas no pisan el estado
    run: u64,
}

#[derive(Clone)]
pub struct MapperAgent {
    self_addr: Arc<String>,
    fs: Arc<dyn FileStore>,
    scripts: Arc<ScriptRegistry>,
    store: Arc<IntermediateStore>,
    script_dir: Arc<PathBuf>,
    coordinator: Arc<dyn CoordinatorClient>,
    tasks: Arc<Mutex<BTreeMap<MapKey, MapTaskState>>>,
    runs: Arc<AtomicU64>,
}

impl MapperAgent {
    pub fn new(
        self_addr: String,
        fs: Arc<dyn FileStore>,
        scripts: Arc<ScriptRegistry>,
        store: Arc<IntermediateStore>,
        script_dir: PathBuf,
        coordinator: Arc<dyn CoordinatorClient>,
    ) -> Self {
        Self {
            self_addr: Arc::new(self_addr),
            fs,
            scripts,
            store,
            script_dir: Arc::new(script_dir),
            coordinator,
            tasks: Arc::new(Mutex::new(BTreeMap::new())),
            runs: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registra el map task y lo arranca en segundo plano.
    /// Un duplicado sin `restart` se rechaza con `already_exists`.
    pub fn map(&self, req: MapRequest) -> MapAck {
        let key = (req.task_id.clone(), req.chunk_path.clone());
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut tasks = lock(&self.tasks);
            if tasks.contains_key(&key) && !req.restart {
                debug!("map task {:?} ya existe", key);
                return MapAck::AlreadyExists;
            }
            tasks.insert(
                key,
                MapTaskState {
                    status: MapStatus::Accepted,
                    run,
                },
            );
        }

        info!(
            "map task aceptado: task={} chunk={} reduce_count={} restart={}",
            req.task_id, req.chunk_path, req.reduce_count, req.restart
        );

        let agent = self.clone();
        tokio::spawn(async move {
            agent.run_map(req, run).await;
        });
        MapAck::Accepted
    }

    pub fn status(&self, task_id: &str, chunk_path: &str) -> Option<MapStatus> {
        lock(&self.tasks)
            .get(&(task_id.to_string(), chunk_path.to_string()))
            .map(|s| s.status)
    }

    /// Concatenación, chunk por chunk, de lo que este worker mapeó para la región.
    pub fn read_mapped_data(&self, task_id: &str, region: u32) -> MappedData {
        let chunks: Vec<String> = {
            let tasks = lock(&self.tasks);
            let known: Vec<(&MapKey, &MapTaskState)> =
                tasks.iter().filter(|((t, _), _)| t == task_id).collect();
            if known.is_empty() {
                return MappedData::not_found();
            }
            known
                .into_iter()
                .filter(|(_, s)| s.status.is_mapped())
                .map(|((_, chunk), _)| chunk.clone())
                .collect()
        };

        let mut data = Vec::new();
        for chunk in &chunks {
            match self.store.load(task_id, chunk, region) {
                Ok(Some(tuples)) => data.extend(tuples),
                Ok(None) => {}
                Err(e) => warn!("no se pudo leer region {} de {}: {:#}", region, chunk, e),
            }
        }

        MappedData {
            status: DataStatus::Ok,
            data,
        }
    }

    fn set_status(&self, key: &MapKey, run: u64, status: MapStatus) {
        if let Some(state) = lock(&self.tasks).get_mut(key) {
            if state.run == run {
                state.status = status;
            }
        }
    }

    async fn run_map(self, req: MapRequest, run: u64) {
        let key = (req.task_id.clone(), req.chunk_path.clone());

        let agent = self.clone();
        let job = req.clone();
        let status = match tokio::task::spawn_blocking(move || agent.map_pipeline(&job, run)).await {
            Ok(status) => status,
            Err(e) => {
                warn!("panic o join error en map de {}: {:?}", req.chunk_path, e);
                MapStatus::ExecMapError
            }
        };
        self.set_status(&key, run, status);

        if status != MapStatus::Finished {
            warn!(
                "map task {} / {} terminó con {:?}",
                req.task_id, req.chunk_path, status
            );
            return;
        }

        info!("map task {} / {} terminado, avisando al master", req.task_id, req.chunk_path);
        let done = MappingDoneRequest {
            worker_addr: self.self_addr.to_string(),
            task_id: req.task_id.clone(),
            chunk_path: req.chunk_path.clone(),
        };
        if let Err(e) = self.coordinator.mapping_done(&done).await {
            warn!("no se pudo avisar mapping_done de {}: {:#}", req.chunk_path, e);
        }
    }

    /// Etapas del map. Devuelve `Finished` o el estado de error terminal.
    fn map_pipeline(&self, req: &MapRequest, run: u64) -> MapStatus {
        let key = (req.task_id.clone(), req.chunk_path.clone());

        // 1) chunk
        let bytes = match self.fs.get_chunk(&req.chunk_path) {
            Ok(b) => b,
            Err(e) => {
                warn!("no se pudo cargar el chunk {}: {}", req.chunk_path, e);
                return MapStatus::ChunkNotFound;
            }
        };
        self.set_status(&key, run, MapStatus::ChunkLoaded);

        // 2) script
        let program = match load_script(
            &self.scripts,
            self.fs.as_ref(),
            &self.script_dir,
            &req.task_id,
            &format!("map-{}", run),
            &req.script_path,
        ) {
            Ok(p) => p,
            Err(ScriptError::NotFound(path)) => {
                warn!("script de map no encontrado: {}", path);
                return MapStatus::MapScriptNotFound;
            }
            Err(e) => {
                warn!("error cargando script de map {}: {}", req.script_path, e);
                return MapStatus::MapScriptLoadingError;
            }
        };
        self.set_status(&key, run, MapStatus::MapperLoaded);

        // 3) map
        let input = String::from_utf8_lossy(&bytes);
        let tuples = match catch_unwind(AssertUnwindSafe(|| program.mapper.map(&input))) {
            Ok(Ok(tuples)) => tuples,
            Ok(Err(e)) => {
                warn!("el script {} falló sobre {}: {:#}", program.name, req.chunk_path, e);
                return MapStatus::ExecMapError;
            }
            Err(_) => {
                warn!("el script {} hizo panic sobre {}", program.name, req.chunk_path);
                return MapStatus::ExecMapError;
            }
        };
        debug!("{} tuplas de {}", tuples.len(), req.chunk_path);
        self.set_status(&key, run, MapStatus::MapApplied);

        // 4) particiones ordenadas + 5) persistencia
        let buckets = partition_tuples(tuples, req.reduce_count);
        if req.restart {
            if let Err(e) = self.store.clear_chunk(&req.task_id, &req.chunk_path) {
                warn!("no se pudo limpiar la salida previa de {}: {:#}", req.chunk_path, e);
                return MapStatus::SavePartitionsErr;
            }
        }
        for (region, bucket) in &buckets {
            if let Err(e) = self.store.save(&req.task_id, &req.chunk_path, *region, bucket) {
                warn!("error guardando region {} de {}: {:#}", region, req.chunk_path, e);
                return MapStatus::SavePartitionsErr;
            }
        }
        self.set_status(&key, run, MapStatus::PartitionsSaved);

        MapStatus::Finished
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use common::{fs::LocalFs, KeyValue, ReducingDoneRequest, WorkerHeartbeatRequest};
    use std::time::Duration;

    #[derive(Default)]
    pub(crate) struct RecordingCoordinator {
        pub mapped: Mutex<Vec<MappingDoneRequest>>,
        pub reduced: Mutex<Vec<ReducingDoneRequest>>,
        pub fail: bool,
    }

    #[async_trait]
    impl CoordinatorClient for RecordingCoordinator {
        async fn heartbeat(&self, _req: &WorkerHeartbeatRequest) -> Result<()> {
            Ok(())
        }

        async fn mapping_done(&self, req: &MappingDoneRequest) -> Result<()> {
            self.mapped.lock().unwrap().push(req.clone());
            if self.fail {
                anyhow::bail!("master caído");
            }
            Ok(())
        }

        async fn reducing_done(&self, req: &ReducingDoneRequest) -> Result<()> {
            self.reduced.lock().unwrap().push(req.clone());
            if self.fail {
                anyhow::bail!("master caído");
            }
            Ok(())
        }
    }

    pub(crate) fn temp_fs(sub: &str) -> LocalFs {
        let base = std::env::temp_dir().join("worker_agent_tests").join(sub);
        let _ = std::fs::remove_dir_all(&base);
        std::fs::create_dir_all(&base).unwrap();
        LocalFs::new(base)
    }

    pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..300 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("la condición no se cumplió a tiempo");
    }

    fn agent(fs: &LocalFs, coordinator: Arc<RecordingCoordinator>) -> MapperAgent {
        MapperAgent::new(
            "http://w1:9090".to_string(),
            Arc::new(fs.clone()),
            Arc::new(ScriptRegistry::with_builtin()),
            Arc::new(IntermediateStore::new(fs.root().join("work"))),
            fs.root().join("scripts"),
            coordinator,
        )
    }

    fn request(chunk: &str, script: &str) -> MapRequest {
        MapRequest {
            task_id: "t1".to_string(),
            reduce_count: 2,
            chunk_path: chunk.to_string(),
            script_path: script.to_string(),
            restart: false,
        }
    }

    fn is_terminal(status: Option<MapStatus>) -> bool {
        status.map(|s| !s.in_progress()).unwrap_or(false)
    }

    #[tokio::test]
    async fn map_particiona_guarda_y_avisa_al_master() {
        let fs = temp_fs("map_ok");
        fs.save(b"aa yy jj aa", "/input/a.txt").unwrap();
        fs.save(b"word_count", "/scripts/wc").unwrap();
        let coordinator = Arc::new(RecordingCoordinator::default());
        let mapper = agent(&fs, coordinator.clone());

        assert_eq!(mapper.map(request("/input/a.txt", "/scripts/wc")), MapAck::Accepted);
        wait_until(|| is_terminal(mapper.status("t1", "/input/a.txt"))).await;
        assert_eq!(mapper.status("t1", "/input/a.txt"), Some(MapStatus::Finished));

        wait_until(|| coordinator.mapped.lock().unwrap().len() == 1).await;
        let done = coordinator.mapped.lock().unwrap()[0].clone();
        assert_eq!(done.worker_addr, "http://w1:9090");
        assert_eq!(done.chunk_path, "/input/a.txt");

        // "aa" cae en la región 2 con 2 regiones (24929 % 2 = 1)
        let region2 = mapper.read_mapped_data("t1", 2);
        assert_eq!(region2.status, DataStatus::Ok);
        let aa: Vec<&KeyValue> = region2.data.iter().filter(|kv| kv.key.to_string() == "aa").collect();
        assert_eq!(aa.len(), 2);

        let total = mapper.read_mapped_data("t1", 1).data.len() + region2.data.len();
        assert_eq!(total, 4);

        // cada bucket persistido viene ordenado por clave
        let keys: Vec<String> = region2.data.iter().map(|kv| kv.key.to_string()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[tokio::test]
    async fn map_duplicado_sin_restart_es_already_exists() {
        let fs = temp_fs("map_dup");
        fs.save(b"aa", "/input/a.txt").unwrap();
        fs.save(b"word_count", "/scripts/wc").unwrap();
        let mapper = agent(&fs, Arc::new(RecordingCoordinator::default()));

        assert_eq!(mapper.map(request("/input/a.txt", "/scripts/wc")), MapAck::Accepted);
        assert_eq!(mapper.map(request("/input/a.txt", "/scripts/wc")), MapAck::AlreadyExists);

        wait_until(|| is_terminal(mapper.status("t1", "/input/a.txt"))).await;
        let mut again = request("/input/a.txt", "/scripts/wc");
        again.restart = true;
        assert_eq!(mapper.map(again), MapAck::Accepted);
        wait_until(|| mapper.status("t1", "/input/a.txt") == Some(MapStatus::Finished)).await;
    }

    #[tokio::test]
    async fn chunk_inexistente_es_chunk_not_found_y_no_avisa() {
        let fs = temp_fs("map_no_chunk");
        fs.save(b"word_count", "/scripts/wc").unwrap();
        let coordinator = Arc::new(RecordingCoordinator::default());
        let mapper = agent(&fs, coordinator.clone());

        mapper.map(request("/input/nada.txt", "/scripts/wc"));
        wait_until(|| is_terminal(mapper.status("t1", "/input/nada.txt"))).await;

        assert_eq!(mapper.status("t1", "/input/nada.txt"), Some(MapStatus::ChunkNotFound));
        assert!(coordinator.mapped.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn errores_de_script_dejan_estado_terminal() {
        let fs = temp_fs("map_bad_script");
        fs.save(b"aa", "/input/a.txt").unwrap();
        fs.save(b"no_existe", "/scripts/raro").unwrap();
        let mapper = agent(&fs, Arc::new(RecordingCoordinator::default()));

        mapper.map(request("/input/a.txt", "/scripts/nada"));
        wait_until(|| is_terminal(mapper.status("t1", "/input/a.txt"))).await;
        assert_eq!(mapper.status("t1", "/input/a.txt"), Some(MapStatus::MapScriptNotFound));

        let mut again = request("/input/a.txt", "/scripts/raro");
        again.restart = true;
        mapper.map(again);
        wait_until(|| mapper.status("t1", "/input/a.txt") == Some(MapStatus::MapScriptLoadingError)).await;
    }

    #[tokio::test]
    async fn script_que_falla_es_exec_map_error() {
        let fs = temp_fs("map_exec_err");
        fs.save(b"(201604, caliente)", "/input/a.txt").unwrap();
        fs.save(b"max_year_temp", "/scripts/mt").unwrap();
        let coordinator = Arc::new(RecordingCoordinator::default());
        let mapper = agent(&fs, coordinator.clone());

        mapper.map(request("/input/a.txt", "/scripts/mt"));
        wait_until(|| is_terminal(mapper.status("t1", "/input/a.txt"))).await;

        assert_eq!(mapper.status("t1", "/input/a.txt"), Some(MapStatus::ExecMapError));
        assert!(coordinator.mapped.lock().unwrap().is_empty());
        assert!(mapper.read_mapped_data("t1", 1).data.is_empty());
    }

    #[tokio::test]
    async fn fallo_al_avisar_no_cambia_el_estado_final() {
        let fs = temp_fs("map_notify_fail");
        fs.save(b"aa", "/input/a.txt").unwrap();
        fs.save(b"word_count", "/scripts/wc").unwrap();
        let coordinator = Arc::new(RecordingCoordinator {
            fail: true,
            ..Default::default()
        });
        let mapper = agent(&fs, coordinator.clone());

        mapper.map(request("/input/a.txt", "/scripts/wc"));
        wait_until(|| coordinator.mapped.lock().unwrap().len() == 1).await;
        assert_eq!(mapper.status("t1", "/input/a.txt"), Some(MapStatus::Finished));
    }

    #[test]
    fn read_mapped_data_de_task_desconocido_es_not_found() {
        let fs = temp_fs("read_unknown");
        let mapper = agent(&fs, Arc::new(RecordingCoordinator::default()));
        let data = mapper.read_mapped_data("otro", 1);
        assert_eq!(data, MappedData::not_found());
    }
}
