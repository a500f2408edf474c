use serde::{Deserialize, Serialize};

/// Estado de un chunk / map task.
///
/// El coordinador y el worker comparten el mismo enum: el worker recorre las
/// fases de su pipeline y el coordinador sólo observa `accepted`,
/// `chunk_loaded` y `map_applied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapStatus {
    Accepted,
    ChunkLoaded,
    MapperLoaded,
    MapApplied,
    PartitionsSaved,
    Finished,

    ChunkNotFound,
    MapScriptNotFound,
    MapScriptLoadingError,
    ExecMapError,
    SavePartitionsErr,
}

impl MapStatus {
    /// `map_applied` o un estado de éxito posterior.
    pub fn is_mapped(self) -> bool {
        matches!(
            self,
            MapStatus::MapApplied | MapStatus::PartitionsSaved | MapStatus::Finished
        )
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            MapStatus::ChunkNotFound
                | MapStatus::MapScriptNotFound
                | MapStatus::MapScriptLoadingError
                | MapStatus::ExecMapError
                | MapStatus::SavePartitionsErr
        )
    }

    pub fn in_progress(self) -> bool {
        !self.is_error() && self != MapStatus::Finished
    }
}

/// Estado de un reduce task (lado worker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceStatus {
    Accepted,
    StartDataLoading,
    DataLoaded,
    ReducerLoaded,
    DataReduced,
    DataSaved,
    Finished,

    ReduceNotFound,
    ReduceScriptNotFound,
    ErrDataLoading,
    ErrReducerLoading,
    ErrReduceScript,
    ErrSaveResult,
    ErrSendDone,
}

impl ReduceStatus {
    pub fn is_error(self) -> bool {
        matches!(
            self,
            ReduceStatus::ReduceNotFound
                | ReduceStatus::ReduceScriptNotFound
                | ReduceStatus::ErrDataLoading
                | ReduceStatus::ErrReducerLoading
                | ReduceStatus::ErrReduceScript
                | ReduceStatus::ErrSaveResult
                | ReduceStatus::ErrSendDone
        )
    }

    pub fn in_progress(self) -> bool {
        !self.is_error() && self != ReduceStatus::Finished
    }
}

/// Una unidad de entrada del map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_path: String,
    /// Worker asignado (vacío = ninguno)
    pub worker: Option<String>,
    pub status: MapStatus,
    /// Veces que el chunk se volvió a despachar tras una caída
    pub attempts: u32,
}

impl Chunk {
    pub fn new(chunk_path: impl Into<String>) -> Self {
        Self {
            chunk_path: chunk_path.into(),
            worker: None,
            status: MapStatus::Accepted,
            attempts: 0,
        }
    }
}

/// Una región de reduce (1..=reduce_count).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub number: u32,
    /// Workers que tienen datos mapeados para esta región
    pub mappers: Vec<String>,
    /// Worker asignado para reducirla
    pub worker: String,
    /// Si ya se envió el `reduce` al worker actual
    pub dispatched: bool,
}
