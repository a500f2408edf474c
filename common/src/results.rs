use serde::{Deserialize, Serialize};

use crate::job::{TaskId, TaskStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResults {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Rutas de salida en el file store; vacío hasta `task_done`
    pub paths: Vec<String>,
}

/// Directorio de resultados de un task: `/{task_id}/result`.
pub fn result_dir(task_id: &str) -> String {
    format!("/{}/result", task_id)
}

/// Ruta del resultado de una región: `/{task_id}/result/{region}`.
pub fn result_path(task_id: &str, region: u32) -> String {
    format!("{}/{}", result_dir(task_id), region)
}
