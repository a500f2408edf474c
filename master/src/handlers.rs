use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{
    CreateTaskRequest, CreateTaskResponse, DoneResponse, MappingDoneRequest, ReducingDoneRequest,
    TaskInfo, TaskResults, WorkerHeartbeatRequest, WorkerHeartbeatResponse, WorkerMetrics,
};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::tracker::{JobTracker, TrackerError};

pub fn build_router(tracker: JobTracker) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/tasks", post(create_task))
        .route("/api/v1/tasks/:id", get(get_task))
        .route("/api/v1/tasks/:id/result", get(get_task_result))
        .route("/api/v1/workers", get(list_workers))
        .route("/api/v1/workers/heartbeat", post(worker_heartbeat))
        .route("/api/v1/mapping/done", post(mapping_done))
        .route("/api/v1/reducing/done", post(reducing_done))
        .layer(TraceLayer::new_for_http())
        .with_state(tracker)
}

fn status_of(err: TrackerError) -> StatusCode {
    match err {
        TrackerError::NotFound(what) => {
            warn!("no encontrado: {}", what);
            StatusCode::NOT_FOUND
        }
        TrackerError::NoWorkers => StatusCode::SERVICE_UNAVAILABLE,
        TrackerError::Fs(e) => {
            warn!("error de file store: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

async fn create_task(
    State(tracker): State<JobTracker>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<CreateTaskResponse>, StatusCode> {
    let task_id = tracker
        .create_task(&req.input, &req.script)
        .map_err(status_of)?;
    Ok(Json(CreateTaskResponse { task_id }))
}

async fn get_task(
    State(tracker): State<JobTracker>,
    Path(id): Path<String>,
) -> Result<Json<TaskInfo>, StatusCode> {
    tracker.get_status(&id).map(Json).map_err(status_of)
}

async fn get_task_result(
    State(tracker): State<JobTracker>,
    Path(id): Path<String>,
) -> Result<Json<TaskResults>, StatusCode> {
    tracker.get_result(&id).map(Json).map_err(status_of)
}

async fn list_workers(State(tracker): State<JobTracker>) -> Json<Vec<WorkerMetrics>> {
    Json(tracker.list_workers())
}

async fn worker_heartbeat(
    State(tracker): State<JobTracker>,
    Json(req): Json<WorkerHeartbeatRequest>,
) -> Json<WorkerHeartbeatResponse> {
    tracker.heartbeat(&req.worker_addr, req.cpu_percent, req.mem_bytes);
    Json(WorkerHeartbeatResponse { ok: true })
}

async fn mapping_done(
    State(tracker): State<JobTracker>,
    Json(req): Json<MappingDoneRequest>,
) -> Result<Json<DoneResponse>, StatusCode> {
    tracker
        .mapping_done(&req.worker_addr, &req.task_id, &req.chunk_path)
        .map_err(status_of)?;
    Ok(Json(DoneResponse { ok: true }))
}

async fn reducing_done(
    State(tracker): State<JobTracker>,
    Json(req): Json<ReducingDoneRequest>,
) -> Result<Json<DoneResponse>, StatusCode> {
    tracker
        .reducing_done(&req.worker_addr, &req.task_id, req.region)
        .map_err(status_of)?;
    Ok(Json(DoneResponse { ok: true }))
}
