use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use buddy_core::{
    Backend, ChatError, ChatService, HttpBackend, ServerConfig, SessionState, StreamConfig,
};
use buddy_protocol::{Role, SseDecoder, SseFrame, StreamRequest};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;

// ── Mock pipeline backend ────────────────────────────────────────────

#[derive(Clone, Default)]
struct Mock {
    received: Arc<Mutex<Vec<(String, String, Option<String>)>>>,
    deleted: Arc<Mutex<Vec<String>>>,
}

const FRAMES: [(&str, &str); 4] = [
    ("status", "Processing"),
    ("classification", "track"),
    ("assistant", "Done."),
    ("done", "Complete"),
];

async fn open_stream(
    State(mock): State<Mock>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<StreamRequest>,
) -> Response {
    if id == "missing" {
        return (StatusCode::NOT_FOUND, "thread not found").into_response();
    }
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    mock.received.lock().unwrap().push((id, request.content, accept));

    // Split the encoded frames at awkward points.
    let encoded: String = FRAMES
        .iter()
        .map(|(event_type, data)| SseFrame::new(*event_type, *data).encode())
        .collect();
    let bytes = encoded.into_bytes();
    let chunks: Vec<Result<Vec<u8>, Infallible>> =
        bytes.chunks(7).map(|chunk| Ok(chunk.to_vec())).collect();
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(futures::stream::iter(chunks)),
    )
        .into_response()
}

async fn cancel_stream(Path(id): Path<String>) -> StatusCode {
    match id.as_str() {
        "busy" => StatusCode::NO_CONTENT,
        "broken" => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::NOT_FOUND,
    }
}

async fn detailed(Path(id): Path<String>) -> Json<Value> {
    Json(json!({
        "thread_id": id,
        "created_at": "2025-04-02T18:30:00",
        "messages": [
            { "id": "u1", "role": "user", "content": "mute track 1", "timestamp": "2025-04-02T18:30:01" },
            { "role": "status", "content": "Status: Processing" },
            { "id": "c1", "role": "classification", "content": "Classification: track", "timestamp": "2025-04-02T18:30:02.500" },
            { "id": "x1", "role": "system", "content": "internal" },
            { "id": "a1", "role": "assistant", "content": "Done.", "timestamp": "2025-04-02T18:30:03Z" }
        ]
    }))
}

async fn list_threads() -> Json<Value> {
    Json(json!([
        { "thread_id": "t2", "created_at": "2025-04-02T18:00:00", "message_count": 4, "summary": "Muting tracks" },
        { "thread_id": "t1", "created_at": "2025-04-01T09:00:00", "message_count": 0, "summary": "" }
    ]))
}

async fn create_thread() -> Json<Value> {
    Json(json!({ "thread_id": "t3", "created_at": "2025-04-02T19:00:00" }))
}

async fn delete_thread(State(mock): State<Mock>, Path(id): Path<String>) -> StatusCode {
    mock.deleted.lock().unwrap().push(id);
    StatusCode::OK
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn start_server(mock: Mock) -> SocketAddr {
    let app = Router::new()
        .route("/", get(health))
        .route("/threads", get(list_threads).post(create_thread))
        .route("/threads/{id}", axum::routing::delete(delete_thread))
        .route("/threads/{id}/stream", post(open_stream).delete(cancel_stream))
        .route("/threads/{id}/detailed", get(detailed))
        .with_state(mock);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn backend(addr: SocketAddr) -> HttpBackend {
    HttpBackend::new(&ServerConfig {
        base_url: format!("http://{addr}"),
        ..ServerConfig::default()
    })
    .unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_posts_content_and_yields_event_bytes() {
    let mock = Mock::default();
    let addr = start_server(mock.clone()).await;
    let backend = backend(addr);

    let mut stream = backend.open_stream("t1", "mute track 1").await.unwrap();
    let mut decoder = SseDecoder::new();
    let mut frames = Vec::new();
    while let Some(chunk) = stream.next().await {
        for frame in decoder.push(&chunk.unwrap()) {
            frames.push(frame.unwrap());
        }
    }
    assert!(decoder.finish().is_none());

    let expected: Vec<SseFrame> = FRAMES
        .iter()
        .map(|(event_type, data)| SseFrame::new(*event_type, *data))
        .collect();
    assert_eq!(frames, expected);
    assert_eq!(
        mock.received.lock().unwrap().as_slice(),
        &[(
            "t1".to_string(),
            "mute track 1".to_string(),
            Some("text/event-stream".to_string())
        )]
    );
}

#[tokio::test]
async fn stream_on_unknown_thread_reports_status() {
    let addr = start_server(Mock::default()).await;
    let result = backend(addr).open_stream("missing", "hi").await;
    match result {
        Err(ChatError::Http { status, body }) => {
            assert_eq!(status, 404);
            assert_eq!(body, "thread not found");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("stream opened for a missing thread"),
    }
}

#[tokio::test]
async fn cancel_without_active_stream_succeeds() {
    let addr = start_server(Mock::default()).await;
    let backend = backend(addr);

    backend.cancel_stream("busy").await.unwrap();
    backend.cancel_stream("idle").await.unwrap();
    // Repeating the stop is harmless.
    backend.cancel_stream("idle").await.unwrap();
    assert!(matches!(
        backend.cancel_stream("broken").await,
        Err(ChatError::Http { status: 500, .. })
    ));
}

#[tokio::test]
async fn detailed_log_converts_to_entries() {
    let addr = start_server(Mock::default()).await;
    let entries = backend(addr).fetch_entries("t1").await.unwrap();

    let roles: Vec<Role> = entries.iter().map(|e| e.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Status, Role::Classification, Role::Other, Role::Assistant]
    );
    // Missing id and timestamp are filled in.
    assert_eq!(entries[1].id, "t1:1");
    assert_eq!(entries[1].timestamp, entries[0].timestamp);
    assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert!(entries.iter().all(|e| e.thread_id == "t1"));
}

#[tokio::test]
async fn thread_management_endpoints() {
    let mock = Mock::default();
    let addr = start_server(mock.clone()).await;
    let backend = backend(addr);

    backend.health().await.unwrap();

    let threads = backend.list_threads().await.unwrap();
    assert_eq!(threads.len(), 2);
    assert_eq!(threads[0].thread_id, "t2");
    assert_eq!(threads[0].message_count, 4);
    assert_eq!(threads[0].summary, "Muting tracks");

    let created = backend.create_thread().await.unwrap();
    assert_eq!(created.thread_id, "t3");

    backend.delete_thread("t2").await.unwrap();
    assert_eq!(mock.deleted.lock().unwrap().as_slice(), &["t2".to_string()]);
}

#[tokio::test]
async fn chat_service_over_http_reconciles_with_the_log() {
    let addr = start_server(Mock::default()).await;
    let (service, mut rx) = ChatService::new(
        Arc::new(backend(addr)),
        StreamConfig {
            reconcile_delay_ms: 10,
            ..StreamConfig::default()
        },
    );
    let drain = tokio::spawn(async move {
        let mut count = 0usize;
        while rx.recv().await.is_some() {
            count += 1;
        }
        count
    });

    let outcome = service.send("t1", "mute track 1").unwrap().wait().await.unwrap();
    assert_eq!(outcome.state, SessionState::Done);
    assert_eq!(outcome.turn.content, "Done.");
    assert_eq!(
        outcome.turn.agent_steps.classification.as_ref().map(|s| s.data.as_str()),
        Some("track")
    );

    let reconciled = outcome.reconciled.unwrap();
    assert_eq!(reconciled.len(), 1);
    assert_eq!(reconciled[0].id, "a1");
    assert_eq!(reconciled[0].content, outcome.turn.content);
    assert_eq!(
        reconciled[0].agent_steps.last_status(),
        outcome.turn.agent_steps.last_status()
    );

    drop(service);
    assert!(drain.await.unwrap() > 0);
}
