//! Live execution event streams over WebSocket.
//!
//! `/ws/tasks/stream` carries events for every task, `/ws/tasks/{id}/stream`
//! only those of one task. The first frame is `{"type":"subscribed"}`; every
//! later frame is a serialized `ExecutionEvent`.

use axum::{
    Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::AppState;
use crate::error::ObserverError;
use crate::stream::{ExecutionEvent, StreamMultiplexer, SubscriptionScope};
use crate::task::TaskId;

pub(crate) fn stream_routes() -> Router<AppState> {
    Router::new()
        .route("/ws/tasks/stream", get(all_tasks_handler))
        .route("/ws/tasks/{id}/stream", get(task_handler))
}

async fn all_tasks_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("Task stream client connecting");
    ws.on_upgrade(move |socket| handle_socket(socket, SubscriptionScope::AllTasks, state.multiplexer))
}

async fn task_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!(task_id = %id, "Task stream client connecting");
    let scope = SubscriptionScope::TaskId(TaskId::from(id));
    ws.on_upgrade(move |socket| handle_socket(socket, scope, state.multiplexer))
}

async fn handle_socket(mut socket: WebSocket, scope: SubscriptionScope, multiplexer: StreamMultiplexer) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ExecutionEvent>();
    let subscription = multiplexer.subscribe(scope.clone(), move |event| {
        tx.send(event.clone())
            .map_err(|_| ObserverError("stream socket closed".to_string()))
    });

    let task_id = match &scope {
        SubscriptionScope::AllTasks => None,
        SubscriptionScope::TaskId(id) => Some(id.to_string()),
    };
    let hello = serde_json::json!({
        "type": "subscribed",
        "task_id": task_id,
        "active": subscription.is_active(),
    });
    if socket.send(Message::Text(hello.to_string().into())).await.is_err() {
        warn!("Failed to send subscription ack, client disconnected");
        subscription.unsubscribe();
        return;
    }
    info!(scope = ?scope, active = subscription.is_active(), "Task stream client connected");

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                if let Ok(json) = serde_json::to_string(&event) {
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        debug!("Task stream client disconnected during send");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Task stream client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Task stream WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    subscription.unsubscribe();
    info!(scope = ?scope, "Task stream connection closed");
}
