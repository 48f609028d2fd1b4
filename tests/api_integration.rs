//! Integration tests for the task REST + stream WebSocket API.
//!
//! REST tests drive the router in-process with `oneshot`; stream tests spin up
//! an Axum server on a random port and connect via tokio-tungstenite.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

use background_agents::api::{AppState, task_routes};
use background_agents::clock::ManualClock;
use background_agents::coordinator::Coordinator;
use background_agents::engine::{ExecutionEngine, StartAck};
use background_agents::error::EngineError;
use background_agents::schedule::StandardCron;
use background_agents::store::InMemoryTaskStore;
use background_agents::stream::{BroadcastTransport, EventKind, ExecutionEvent, StreamMultiplexer};
use background_agents::task::{TaskId, TaskRecord};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);
const CHANNEL: &str = "test:stream";
const T0: i64 = 1_700_000_000_000;

/// Engine that accepts everything and steers nothing.
struct AcceptingEngine;

#[async_trait]
impl ExecutionEngine for AcceptingEngine {
    async fn start(&self, _task: &TaskRecord, _input: Option<&str>) -> Result<StartAck, EngineError> {
        Ok(StartAck::Accepted)
    }
    async fn cancel(&self, _task_id: &TaskId) -> Result<(), EngineError> {
        Ok(())
    }
    async fn steer(&self, _task_id: &TaskId, _instruction: &str) -> Result<bool, EngineError> {
        Ok(false)
    }
}

struct TestApp {
    router: Router,
    transport: Arc<BroadcastTransport>,
}

fn test_app() -> TestApp {
    let coordinator = Arc::new(Coordinator::new(
        Arc::new(InMemoryTaskStore::new()),
        Arc::new(AcceptingEngine),
        Arc::new(StandardCron),
        Arc::new(ManualClock::new(T0)),
    ));
    let transport = Arc::new(BroadcastTransport::new(64));
    let multiplexer = StreamMultiplexer::new(transport.clone(), CHANNEL);
    TestApp {
        router: task_routes(AppState::new(coordinator, multiplexer)),
        transport,
    }
}

/// Start an Axum server on a random port, return (port, transport).
async fn start_server() -> (u16, Arc<BroadcastTransport>) {
    let app = test_app();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app.router).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, app.transport)
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn hourly_body(id: &str) -> Value {
    json!({
        "id": id,
        "name": "Inbox digest",
        "agent_id": "agent-1",
        "schedule": { "type": "interval", "interval_ms": 3_600_000 }
    })
}

/// Parse a WS text frame into a serde_json::Value.
fn parse_ws_json(msg: &Message) -> Value {
    match msg {
        Message::Text(txt) => serde_json::from_str(txt).expect("invalid JSON from server"),
        other => panic!("expected Text frame, got {:?}", other),
    }
}

// ── REST Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn health_endpoint() {
    let app = test_app();
    let (status, body) = send(&app.router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn create_get_and_list_tasks() {
    let app = test_app();

    let (status, created) = send(&app.router, Method::POST, "/api/tasks", Some(hourly_body("t1"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], "t1");
    assert_eq!(created["status"], "active");
    assert_eq!(created["next_run_at"], T0);

    let (status, fetched) = send(&app.router, Method::GET, "/api/tasks/t1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, list) = send(&app.router, Method::GET, "/api/tasks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (_, paused) = send(&app.router, Method::GET, "/api/tasks?status=paused", None).await;
    assert!(paused.as_array().unwrap().is_empty());

    let (status, _) = send(&app.router, Method::GET, "/api/tasks?status=sleeping", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, Method::GET, "/api/tasks/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_tasks_are_rejected() {
    let app = test_app();

    let bad_interval = json!({
        "name": "x",
        "agent_id": "a",
        "schedule": { "type": "interval", "interval_ms": 0 }
    });
    let (status, body) = send(&app.router, Method::POST, "/api/tasks", Some(bad_interval)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("positive"));

    let bad_cron = json!({
        "name": "x",
        "agent_id": "a",
        "schedule": { "type": "cron", "expression": "every tuesday" }
    });
    let (status, _) = send(&app.router, Method::POST, "/api/tasks", Some(bad_cron)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let no_schedule = json!({ "name": "x", "agent_id": "a" });
    let (status, body) = send(&app.router, Method::POST, "/api/tasks", Some(no_schedule)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("schedule"));

    let (status, _) = send(&app.router, Method::POST, "/api/tasks", Some(hourly_body("dup"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&app.router, Method::POST, "/api/tasks", Some(hourly_body("dup"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn lifecycle_over_rest() {
    let app = test_app();
    send(&app.router, Method::POST, "/api/tasks", Some(hourly_body("t1"))).await;

    let (_, runnable) = send(&app.router, Method::GET, "/api/tasks/runnable", None).await;
    assert_eq!(runnable.as_array().unwrap().len(), 1);

    let (status, paused) = send(&app.router, Method::POST, "/api/tasks/t1/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paused["status"], "paused");
    assert_eq!(paused["next_run_at"], Value::Null);

    // Pausing twice is a precondition failure.
    let (status, _) = send(&app.router, Method::POST, "/api/tasks/t1/pause", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, resumed) = send(&app.router, Method::POST, "/api/tasks/t1/resume", None).await;
    assert_eq!(resumed["status"], "active");

    let (_, cancel) = send(&app.router, Method::POST, "/api/tasks/t1/cancel", None).await;
    assert_eq!(cancel["cancelled"], false);

    let (status, run) = send(&app.router, Method::POST, "/api/tasks/t1/run", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "started");
    assert_eq!(run["task"]["status"], "running");

    let (_, again) = send(&app.router, Method::POST, "/api/tasks/t1/run", None).await;
    assert_eq!(again["status"], "already_running");

    let (_, steer) = send(
        &app.router,
        Method::POST,
        "/api/tasks/t1/steer",
        Some(json!({ "instruction": "wrap up" })),
    )
    .await;
    assert_eq!(steer["delivered"], false);

    let (_, cancel) = send(&app.router, Method::POST, "/api/tasks/t1/cancel", None).await;
    assert_eq!(cancel["cancelled"], true);

    let (status, _) = send(&app.router, Method::DELETE, "/api/tasks/t1", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn patch_and_delete() {
    let app = test_app();
    send(&app.router, Method::POST, "/api/tasks", Some(hourly_body("t1"))).await;

    let (status, patched) = send(
        &app.router,
        Method::PATCH,
        "/api/tasks/t1",
        Some(json!({
            "name": "Morning digest",
            "schedule": { "type": "cron", "expression": "0 9 * * *", "timezone": "Europe/Berlin" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["name"], "Morning digest");
    assert_eq!(patched["schedule"]["type"], "cron");

    let (status, _) = send(
        &app.router,
        Method::PATCH,
        "/api/tasks/t1",
        Some(json!({ "schedule": { "type": "cron", "expression": "0 9 * * *", "timezone": "Nowhere/City" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, Method::DELETE, "/api/tasks/t1", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app.router, Method::DELETE, "/api/tasks/t1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn steer_or_start_starts_idle_task() {
    let app = test_app();
    send(&app.router, Method::POST, "/api/tasks", Some(hourly_body("t1"))).await;

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/tasks/t1/steer",
        Some(json!({ "instruction": "check the calendar", "start_if_idle": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "started");

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/tasks/t1/steer",
        Some(json!({ "instruction": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── WebSocket Tests ──────────────────────────────────────────────────

#[tokio::test]
async fn task_stream_only_forwards_its_task() {
    timeout(TEST_TIMEOUT, async {
        let (port, transport) = start_server().await;

        let (mut ws, _resp) = connect_async(format!("ws://127.0.0.1:{port}/ws/tasks/t1/stream"))
            .await
            .expect("WS connect failed");

        let hello = parse_ws_json(&ws.next().await.unwrap().unwrap());
        assert_eq!(hello["type"], "subscribed");
        assert_eq!(hello["task_id"], "t1");
        assert_eq!(hello["active"], true);

        transport.emit(CHANNEL, ExecutionEvent::new("t2", 1, EventKind::Turn { iteration: 1 }));
        transport.emit(CHANNEL, ExecutionEvent::new("t1", 2, EventKind::Turn { iteration: 7 }));

        let frame = parse_ws_json(&ws.next().await.unwrap().unwrap());
        assert_eq!(frame["task_id"], "t1");
        assert_eq!(frame["kind"]["type"], "turn");
        assert_eq!(frame["kind"]["iteration"], 7);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn all_tasks_stream_preserves_order() {
    timeout(TEST_TIMEOUT, async {
        let (port, transport) = start_server().await;

        let (mut ws, _resp) = connect_async(format!("ws://127.0.0.1:{port}/ws/tasks/stream"))
            .await
            .expect("WS connect failed");
        let hello = parse_ws_json(&ws.next().await.unwrap().unwrap());
        assert_eq!(hello["type"], "subscribed");
        assert_eq!(hello["task_id"], Value::Null);

        transport.emit(CHANNEL, ExecutionEvent::new("a", 1, EventKind::Turn { iteration: 1 }));
        transport.emit(
            CHANNEL,
            ExecutionEvent::new(
                "b",
                2,
                EventKind::Output {
                    text: "hello".to_string(),
                    is_stderr: false,
                },
            ),
        );
        transport.emit(CHANNEL, ExecutionEvent::failed("a", 3, "boom"));

        let mut kinds = Vec::new();
        for _ in 0..3 {
            let frame = parse_ws_json(&ws.next().await.unwrap().unwrap());
            kinds.push(format!(
                "{}:{}",
                frame["task_id"].as_str().unwrap(),
                frame["kind"]["type"].as_str().unwrap()
            ));
        }
        assert_eq!(kinds, vec!["a:turn", "b:output", "a:failed"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn closing_the_socket_releases_the_listener() {
    timeout(TEST_TIMEOUT, async {
        let (port, transport) = start_server().await;

        let (mut ws, _resp) = connect_async(format!("ws://127.0.0.1:{port}/ws/tasks/stream"))
            .await
            .expect("WS connect failed");
        ws.next().await.unwrap().unwrap();
        assert_eq!(transport.listener_count(CHANNEL), 1);

        ws.close(None).await.unwrap();
        while transport.listener_count(CHANNEL) > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("test timed out");
}
