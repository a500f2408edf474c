use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{
    MapRequest, MapResponse, MapStatusRequest, MapStatusResponse, MappedData, ReduceRequest,
    ReduceResponse, ReduceStatusResponse, TaskId,
};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::mapper::MapperAgent;
use crate::reducer::ReducerAgent;

#[derive(Clone)]
pub struct WorkerState {
    pub mapper: MapperAgent,
    pub reducer: ReducerAgent,
}

pub fn build_router(state: WorkerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/map", post(map))
        .route("/api/v1/map/status", post(map_status))
        .route("/api/v1/reduce", post(reduce))
        .route("/api/v1/reduce/:task_id/:region", get(reduce_status))
        .route("/api/v1/mapped/:task_id/:region", get(read_mapped_data))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn map(State(state): State<WorkerState>, Json(req): Json<MapRequest>) -> Json<MapResponse> {
    Json(MapResponse {
        status: state.mapper.map(req),
    })
}

async fn map_status(
    State(state): State<WorkerState>,
    Json(req): Json<MapStatusRequest>,
) -> Result<Json<MapStatusResponse>, StatusCode> {
    let status = state
        .mapper
        .status(&req.task_id, &req.chunk_path)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(MapStatusResponse {
        status,
        in_progress: status.in_progress(),
    }))
}

async fn reduce(State(state): State<WorkerState>, Json(req): Json<ReduceRequest>) -> Json<ReduceResponse> {
    Json(ReduceResponse {
        status: state.reducer.reduce(req),
    })
}

async fn reduce_status(
    State(state): State<WorkerState>,
    Path((task_id, region)): Path<(TaskId, u32)>,
) -> Json<ReduceStatusResponse> {
    Json(ReduceStatusResponse {
        status: state.reducer.status(&task_id, region),
    })
}

// lectura de disco: fuera del runtime async
async fn read_mapped_data(
    State(state): State<WorkerState>,
    Path((task_id, region)): Path<(TaskId, u32)>,
) -> Result<Json<MappedData>, StatusCode> {
    tokio::task::spawn_blocking(move || state.mapper.read_mapped_data(&task_id, region))
        .await
        .map(Json)
        .map_err(|e| {
            warn!("error leyendo datos mapeados: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
