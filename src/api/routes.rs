//! REST endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::{debug, info};

use super::{ApiResponse, AppState, error_response};
use crate::coordinator::{RunNowOutcome, SteerOutcome};
use crate::task::{NewTask, TaskId, TaskPatch, TaskStatus};

pub(crate) fn rest_routes() -> Router<AppState> {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/runnable", get(runnable_tasks))
        .route(
            "/api/tasks/{id}",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/api/tasks/{id}/pause", post(pause_task))
        .route("/api/tasks/{id}/resume", post(resume_task))
        .route("/api/tasks/{id}/run", post(run_task))
        .route("/api/tasks/{id}/cancel", post(cancel_task))
        .route("/api/tasks/{id}/steer", post(steer_task))
}

fn ok(value: impl serde::Serialize) -> ApiResponse {
    (StatusCode::OK, Json(serde_json::json!(value)))
}

// ── Queries ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list_tasks(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResponse {
    match query.status.as_deref() {
        None => ok(state.coordinator.list().await),
        Some(raw) => match raw.parse::<TaskStatus>() {
            Ok(status) => ok(state.coordinator.list_by_status(status).await),
            Err(e) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e })),
            ),
        },
    }
}

async fn runnable_tasks(State(state): State<AppState>) -> ApiResponse {
    let now = state.coordinator.now();
    ok(state.coordinator.runnable(now).await)
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiResponse {
    match state.coordinator.get(&TaskId::from(id)).await {
        Some(task) => ok(task),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Task not found" })),
        ),
    }
}

// ── Mutations ───────────────────────────────────────────────────────────

async fn create_task(State(state): State<AppState>, Json(body): Json<NewTask>) -> ApiResponse {
    match state.coordinator.create(body).await {
        Ok(task) => {
            info!(task_id = %task.id, "Task created via API");
            (StatusCode::CREATED, Json(serde_json::json!(task)))
        }
        Err(e) => error_response(&e),
    }
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> ApiResponse {
    match state.coordinator.update(&TaskId::from(id), patch).await {
        Ok(task) => ok(task),
        Err(e) => error_response(&e),
    }
}

async fn delete_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiResponse {
    match state.coordinator.delete(&TaskId::from(id)).await {
        Ok(true) => ok(serde_json::json!({ "status": "deleted" })),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Task not found" })),
        ),
        Err(e) => error_response(&e),
    }
}

async fn pause_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiResponse {
    match state.coordinator.pause(&TaskId::from(id)).await {
        Ok(task) => ok(task),
        Err(e) => error_response(&e),
    }
}

async fn resume_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiResponse {
    match state.coordinator.resume(&TaskId::from(id)).await {
        Ok(task) => ok(task),
        Err(e) => error_response(&e),
    }
}

async fn run_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiResponse {
    match state.coordinator.run_now(&TaskId::from(id)).await {
        Ok(RunNowOutcome::Started(task)) => ok(serde_json::json!({
            "status": "started",
            "task": task,
        })),
        Ok(RunNowOutcome::AlreadyRunning) => ok(serde_json::json!({ "status": "already_running" })),
        Err(e) => error_response(&e),
    }
}

async fn cancel_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiResponse {
    match state.coordinator.cancel(&TaskId::from(id)).await {
        Ok(cancelled) => ok(serde_json::json!({ "cancelled": cancelled })),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct SteerRequest {
    instruction: String,
    /// Start a new execution with the instruction when nothing is running.
    #[serde(default)]
    start_if_idle: bool,
}

async fn steer_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SteerRequest>,
) -> ApiResponse {
    let id = TaskId::from(id);
    if body.instruction.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Missing required field: instruction" })),
        );
    }

    if !body.start_if_idle {
        return match state.coordinator.steer(&id, &body.instruction).await {
            Ok(delivered) => ok(serde_json::json!({ "delivered": delivered })),
            Err(e) => error_response(&e),
        };
    }

    match state.coordinator.steer_or_start(&id, &body.instruction).await {
        Ok(SteerOutcome::Steered) => ok(serde_json::json!({ "status": "steered" })),
        Ok(SteerOutcome::Started(task)) => ok(serde_json::json!({
            "status": "started",
            "task": task,
        })),
        Ok(SteerOutcome::AlreadyRunning) => {
            debug!(task_id = %id, "Steer not delivered to running execution");
            ok(serde_json::json!({ "status": "already_running" }))
        }
        Err(e) => error_response(&e),
    }
}
