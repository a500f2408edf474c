// master/src/state.rs

use chrono::{DateTime, Utc};
use common::{
    Chunk, MapStatus, Region, TaskId, TaskInfo, TaskStatus, WorkerAddr, WorkerMetrics,
};
use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

/// Lock que sigue usando los datos aunque otro hilo haya paniqueado con el lock tomado.
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone)]
pub struct WorkerMeta {
    pub last_heartbeat: Instant,
    pub cpu_percent: Option<f32>,
    pub mem_bytes: Option<u64>,
}

#[derive(Default)]
struct RegistryInner {
    workers: HashMap<WorkerAddr, WorkerMeta>,
    // orden de registro, para el round robin de regiones
    order: Vec<WorkerAddr>,
    // workers libres, FIFO
    free: VecDeque<WorkerAddr>,
}

/// Registro de workers vivos + cola de workers libres.
///
/// Sólo se accede a través de operaciones atómicas (registrar, desalojar,
/// sacar/devolver libre), nunca al mapa crudo.
#[derive(Default)]
pub struct WorkerRegistry {
    inner: Mutex<RegistryInner>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert del último heartbeat. Devuelve `true` si el worker es nuevo
    /// (en ese caso entra a la cola de libres).
    pub fn heartbeat(&self, addr: &str, cpu_percent: Option<f32>, mem_bytes: Option<u64>) -> bool {
        let mut inner = lock(&self.inner);
        let now = Instant::now();

        if let Some(meta) = inner.workers.get_mut(addr) {
            meta.last_heartbeat = now;
            if cpu_percent.is_some() {
                meta.cpu_percent = cpu_percent;
            }
            if mem_bytes.is_some() {
                meta.mem_bytes = mem_bytes;
            }
            return false;
        }

        inner.workers.insert(
            addr.to_string(),
            WorkerMeta {
                last_heartbeat: now,
                cpu_percent,
                mem_bytes,
            },
        );
        inner.order.push(addr.to_string());
        inner.free.push_back(addr.to_string());
        true
    }

    /// Primer worker libre (FIFO); queda ocupado.
    pub fn pop_free(&self) -> Option<WorkerAddr> {
        lock(&self.inner).free.pop_front()
    }

    /// Devuelve un worker a la cola de libres si sigue registrado y no estaba ya.
    pub fn push_free(&self, addr: &str) -> bool {
        let mut inner = lock(&self.inner);
        if !inner.workers.contains_key(addr) || inner.free.iter().any(|w| w == addr) {
            return false;
        }
        inner.free.push_back(addr.to_string());
        true
    }

    /// Saca a `addr` de la cola de libres si está ahí.
    pub fn take_if_free(&self, addr: &str) -> bool {
        let mut inner = lock(&self.inner);
        match inner.free.iter().position(|w| w == addr) {
            Some(pos) => {
                inner.free.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn is_alive(&self, addr: &str) -> bool {
        lock(&self.inner).workers.contains_key(addr)
    }

    pub fn is_free(&self, addr: &str) -> bool {
        lock(&self.inner).free.iter().any(|w| w == addr)
    }

    /// Workers vivos en orden de registro.
    pub fn alive(&self) -> Vec<WorkerAddr> {
        lock(&self.inner).order.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).workers.len()
    }

    /// Desaloja los workers sin heartbeat hace más de `timeout`.
    pub fn evict_stale(&self, now: Instant, timeout: Duration) -> Vec<WorkerAddr> {
        let mut inner = lock(&self.inner);

        let dead: Vec<WorkerAddr> = inner
            .order
            .iter()
            .filter(|addr| {
                inner
                    .workers
                    .get(*addr)
                    .map(|m| now.saturating_duration_since(m.last_heartbeat) > timeout)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        if dead.is_empty() {
            return dead;
        }

        inner.workers.retain(|addr, _| !dead.contains(addr));
        inner.order.retain(|addr| !dead.contains(addr));
        inner.free.retain(|addr| !dead.contains(addr));
        dead
    }

    pub fn metrics(&self, now: Instant) -> Vec<WorkerMetrics> {
        let inner = lock(&self.inner);
        inner
            .order
            .iter()
            .filter_map(|addr| {
                let meta = inner.workers.get(addr)?;
                Some(WorkerMetrics {
                    worker_addr: addr.clone(),
                    free: inner.free.iter().any(|w| w == addr),
                    last_heartbeat_ms_ago: now
                        .saturating_duration_since(meta.last_heartbeat)
                        .as_millis() as u64,
                    cpu_percent: meta.cpu_percent,
                    mem_bytes: meta.mem_bytes,
                })
            })
            .collect()
    }
}

/// Un task (job) tal como lo guarda el coordinador.
#[derive(Debug, Clone)]
pub struct TaskEntry {
    pub id: TaskId,
    pub input: String,
    pub script: String,
    pub reduce_count: u32,
    pub status: TaskStatus,
    pub chunks: Vec<Chunk>,
    // sólo existen durante la fase de reduce
    pub regions: BTreeMap<u32, Region>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskEntry {
    pub fn new(id: TaskId, input: &str, script: &str, chunk_paths: Vec<String>, reduce_count: u32) -> Self {
        Self {
            id,
            input: input.to_string(),
            script: script.to_string(),
            reduce_count,
            status: TaskStatus::Accepted,
            chunks: chunk_paths.into_iter().map(Chunk::new).collect(),
            regions: BTreeMap::new(),
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn all_mapped(&self) -> bool {
        self.chunks.iter().all(|c| c.status.is_mapped())
    }

    pub fn next_accepted_chunk(&self) -> Option<usize> {
        self.chunks
            .iter()
            .position(|c| c.status == MapStatus::Accepted)
    }

    /// Workers distintos que mapearon chunks de este task, en orden de chunk.
    pub fn mappers(&self) -> Vec<WorkerAddr> {
        let mut out: Vec<WorkerAddr> = Vec::new();
        for w in self.chunks.iter().filter_map(|c| c.worker.as_ref()) {
            if !out.contains(w) {
                out.push(w.clone());
            }
        }
        out
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id.clone(),
            status: self.status,
            input: self.input.clone(),
            script: self.script.clone(),
            reduce_count: self.reduce_count,
            chunks: self.chunks.clone(),
            pending_regions: self.regions.values().cloned().collect(),
            submitted_at: self.submitted_at,
            finished_at: self.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_registra_una_sola_vez_y_deja_libre() {
        let reg = WorkerRegistry::new();
        assert!(reg.heartbeat("http://a", None, None));
        assert!(!reg.heartbeat("http://a", Some(10.0), None));
        assert!(!reg.heartbeat("http://a", None, None));

        assert_eq!(reg.len(), 1);
        assert!(reg.is_free("http://a"));
        assert_eq!(reg.pop_free().as_deref(), Some("http://a"));
        assert_eq!(reg.pop_free(), None);
    }

    #[test]
    fn heartbeat_de_worker_ocupado_no_lo_vuelve_a_liberar() {
        let reg = WorkerRegistry::new();
        reg.heartbeat("http://a", None, None);
        assert_eq!(reg.pop_free().as_deref(), Some("http://a"));

        reg.heartbeat("http://a", None, None);
        assert!(!reg.is_free("http://a"));
        assert!(reg.push_free("http://a"));
        assert!(!reg.push_free("http://a"));
        assert!(reg.is_free("http://a"));
    }

    #[test]
    fn cola_de_libres_es_fifo() {
        let reg = WorkerRegistry::new();
        reg.heartbeat("http://a", None, None);
        reg.heartbeat("http://b", None, None);
        reg.heartbeat("http://c", None, None);

        assert!(reg.take_if_free("http://b"));
        assert!(!reg.take_if_free("http://b"));
        assert_eq!(reg.pop_free().as_deref(), Some("http://a"));
        reg.push_free("http://b");
        assert_eq!(reg.pop_free().as_deref(), Some("http://c"));
        assert_eq!(reg.pop_free().as_deref(), Some("http://b"));
    }

    #[test]
    fn evict_stale_saca_workers_vencidos_de_todos_lados() {
        let reg = WorkerRegistry::new();
        reg.heartbeat("http://a", None, None);
        reg.heartbeat("http://b", None, None);

        let timeout = Duration::from_secs(2);
        assert!(reg.evict_stale(Instant::now(), timeout).is_empty());

        let later = Instant::now() + Duration::from_secs(3);
        let dead = reg.evict_stale(later, timeout);
        assert_eq!(dead, vec!["http://a".to_string(), "http://b".to_string()]);
        assert_eq!(reg.len(), 0);
        assert_eq!(reg.pop_free(), None);
        assert!(!reg.push_free("http://a"));
    }

    #[test]
    fn heartbeats_repetidos_dentro_del_timeout_no_desalojan() {
        let reg = WorkerRegistry::new();
        let timeout = Duration::from_millis(200);
        for _ in 0..5 {
            reg.heartbeat("http://a", None, None);
            assert!(reg.evict_stale(Instant::now(), timeout).is_empty());
        }
        assert_eq!(reg.alive(), vec!["http://a".to_string()]);
        assert!(reg.is_free("http://a"));
    }

    #[test]
    fn worker_desalojado_vuelve_como_nuevo_y_libre() {
        let reg = WorkerRegistry::new();
        reg.heartbeat("http://a", None, None);
        reg.pop_free();
        reg.evict_stale(Instant::now() + Duration::from_secs(5), Duration::from_secs(1));

        assert!(reg.heartbeat("http://a", None, None));
        assert!(reg.is_free("http://a"));
    }

    #[test]
    fn task_entry_mappers_distintos_en_orden() {
        let mut task = TaskEntry::new(
            "t".into(),
            "/in",
            "/wc",
            vec!["/in/a".into(), "/in/b".into(), "/in/c".into()],
            2,
        );
        task.chunks[0].worker = Some("http://b".into());
        task.chunks[1].worker = Some("http://a".into());
        task.chunks[2].worker = Some("http://b".into());

        assert_eq!(task.mappers(), vec!["http://b".to_string(), "http://a".to_string()]);
        assert!(!task.all_mapped());
        assert_eq!(task.next_accepted_chunk(), Some(0));

        for c in task.chunks.iter_mut() {
            c.status = MapStatus::MapApplied;
        }
        assert!(task.all_mapped());
        assert_eq!(task.next_accepted_chunk(), None);
    }
}
