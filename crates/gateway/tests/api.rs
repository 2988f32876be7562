//! HTTP surface exercised in-process through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use sb_domain::config::Config;
use sb_domain::message::Command;
use sb_gateway::api;
use sb_gateway::runtime::{EchoRunner, InMemoryHistoryStore};
use sb_gateway::{AgentService, AppState};

fn state() -> AppState {
    let mut config = Config::default();
    config.bus.workers = 2;
    config.agent.heartbeat_interval_minutes = 0.0;
    let service = AgentService::new(
        Arc::new(config),
        Arc::new(EchoRunner),
        Arc::new(InMemoryHistoryStore::new()),
    );
    AppState::new(service)
}

fn app(state: &AppState) -> Router {
    api::router().with_state(state.clone())
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_version() {
    let state = state();
    let resp = app(&state)
        .oneshot(Request::get("/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn posted_command_is_answered_on_the_broadcast() {
    let state = state();
    state.service.start().unwrap();
    let mut responses = state.subscribe_responses();

    let resp = app(&state)
        .oneshot(post_json(
            "/v1/commands",
            json!({ "source_id": "web-1", "content": "hello" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body = body_json(resp).await;
    assert_eq!(body["accepted"], true);
    let command_id = body["command_id"].as_str().unwrap().to_owned();
    assert_eq!(command_id.len(), 36);

    let response = tokio::time::timeout(Duration::from_secs(5), responses.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.source_id, "web-1");
    assert_eq!(response.user_id, "default");
    assert_eq!(response.command_id.as_deref(), Some(command_id.as_str()));
    assert!(response.content.starts_with("Echo: hello"));

    state.service.stop().await;
}

#[tokio::test]
async fn command_without_content_is_rejected() {
    let state = state();
    let resp = app(&state)
        .oneshot(post_json("/v1/commands", json!({ "source_id": "x" })))
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn command_after_stop_is_unavailable() {
    let state = state();
    state.service.start().unwrap();
    state.service.stop().await;

    let resp = app(&state)
        .oneshot(post_json("/v1/commands", json!({ "content": "late" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn tools_listing_and_unknown_call() {
    let state = state();
    state.service.start().unwrap();

    let resp = app(&state)
        .oneshot(Request::get("/v1/tools").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["count"], 0);
    assert_eq!(body["tools"], json!([]));

    let resp = app(&state)
        .oneshot(post_json(
            "/v1/tools/call",
            json!({ "name": "fs_read_file", "arguments": { "path": "/tmp/x" } }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["ok"], false);

    state.service.stop().await;
}

#[tokio::test]
async fn tool_call_before_start_is_unavailable() {
    let state = state();
    let resp = app(&state)
        .oneshot(post_json("/v1/tools/call", json!({ "name": "fs_read_file" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn response_stream_delivers_published_responses() {
    use futures_util::StreamExt;

    let state = state();
    state.service.start().unwrap();

    let resp = app(&state)
        .oneshot(Request::get("/v1/responses/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "text/event-stream"
    );

    state.service.handle_command(Command::new("sse-1", "bob", "ping")).await;

    let mut frames = resp.into_body().into_data_stream();
    let chunk = tokio::time::timeout(Duration::from_secs(5), frames.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(text.contains("event: response"));
    assert!(text.contains("\"source_id\":\"sse-1\""));

    state.shutdown.cancel();
    state.service.stop().await;
}
