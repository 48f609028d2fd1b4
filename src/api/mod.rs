//! HTTP and WebSocket surface over the coordinator.
//!
//! - `routes`: REST endpoints for task CRUD and execution control
//! - `ws`: live execution event streams, one multiplexer observer per socket

pub mod routes;
pub mod ws;

use std::sync::Arc;

use axum::{Json, Router, http::StatusCode, routing::get};

use crate::coordinator::Coordinator;
use crate::error::{EngineError, Error, StoreError, ValidationError};
use crate::stream::StreamMultiplexer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub multiplexer: StreamMultiplexer,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>, multiplexer: StreamMultiplexer) -> Self {
        Self {
            coordinator,
            multiplexer,
        }
    }
}

/// Build the Axum router with task REST and stream WebSocket routes.
pub fn task_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(routes::rest_routes())
        .merge(ws::stream_routes())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "background-agents"
    }))
}

pub(crate) type ApiResponse = (StatusCode, Json<serde_json::Value>);

/// Map a coordinator error onto an HTTP status and `{"error": ...}` body.
pub(crate) fn error_response(error: &Error) -> ApiResponse {
    let status = match error {
        Error::TaskNotFound { .. } => StatusCode::NOT_FOUND,
        Error::Validation(ValidationError::DuplicateId { .. }) => StatusCode::CONFLICT,
        Error::Validation(_) | Error::Schedule(_) => StatusCode::BAD_REQUEST,
        Error::Transition(_) => StatusCode::CONFLICT,
        Error::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        Error::Store(StoreError::Constraint(_)) => StatusCode::CONFLICT,
        Error::Engine(EngineError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Engine(_) => StatusCode::BAD_GATEWAY,
        Error::Store(_) | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(serde_json::json!({ "error": error.to_string() })),
    )
}
