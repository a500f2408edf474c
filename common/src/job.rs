use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{Chunk, Region};

/// Id del task (job de MapReduce) que genera el coordinador.
pub type TaskId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    /// Ruta de entrada en el file store (directorio, archivo, chunks o glob)
    pub input: String,
    /// Ruta del script en el file store
    pub script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    pub task_id: TaskId,
}

/// Estado global de un task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Accepted,
    Mapping,
    MappingDone,
    Reducing,
    TaskDone,
}

impl TaskStatus {
    pub fn is_done(self) -> bool {
        matches!(self, TaskStatus::TaskDone)
    }
}

/// Vista de un task tal como la devuelve `get_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub status: TaskStatus,
    pub input: String,
    pub script: String,
    pub reduce_count: u32,
    pub chunks: Vec<Chunk>,
    /// Regiones que todavía no reportaron `reducing_done`
    pub pending_regions: Vec<Region>,

    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskInfo {
    /// Cantidad de chunks que ya pasaron por el map.
    pub fn mapped_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| c.status.is_mapped()).count()
    }
}
