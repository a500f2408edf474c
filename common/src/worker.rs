use serde::{Deserialize, Serialize};

use crate::job::TaskId;
use crate::kv::KeyValue;
use crate::task::{MapStatus, ReduceStatus};

/// Dirección base de un worker, ej: "http://worker-1:9090".
pub type WorkerAddr = String;

/* --------- worker -> coordinador --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeatRequest {
    pub worker_addr: WorkerAddr,
    #[serde(default)]
    pub cpu_percent: Option<f32>,
    #[serde(default)]
    pub mem_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeatResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingDoneRequest {
    pub worker_addr: WorkerAddr,
    pub task_id: TaskId,
    pub chunk_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReducingDoneRequest {
    pub worker_addr: WorkerAddr,
    pub task_id: TaskId,
    pub region: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoneResponse {
    pub ok: bool,
}

/* --------- coordinador -> worker --------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapRequest {
    pub task_id: TaskId,
    pub reduce_count: u32,
    pub chunk_path: String,
    pub script_path: String,
    #[serde(default)]
    pub restart: bool,
}

/// Respuesta de `map`: aceptado o ya existente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapAck {
    Accepted,
    AlreadyExists,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapResponse {
    pub status: MapAck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReduceRequest {
    pub task_id: TaskId,
    pub region: u32,
    pub mappers: Vec<WorkerAddr>,
    pub script_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceResponse {
    pub status: ReduceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapStatusRequest {
    pub task_id: TaskId,
    pub chunk_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapStatusResponse {
    pub status: MapStatus,
    pub in_progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceStatusResponse {
    pub status: ReduceStatus,
}

/* --------- reducer -> mapper (shuffle) --------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStatus {
    Ok,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedData {
    pub status: DataStatus,
    pub data: Vec<KeyValue>,
}

impl MappedData {
    pub fn not_found() -> Self {
        Self {
            status: DataStatus::NotFound,
            data: Vec::new(),
        }
    }
}

/* --------- vista de workers --------- */

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkerMetrics {
    pub worker_addr: WorkerAddr,
    pub free: bool,
    pub last_heartbeat_ms_ago: u64,
    pub cpu_percent: Option<f32>,
    pub mem_bytes: Option<u64>,
}
