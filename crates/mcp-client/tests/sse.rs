//! SSE transport against an in-process axum server that speaks the MCP
//! event-stream handshake.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use sb_domain::config::{McpConfig, McpServerConfig};
use sb_mcp_client::protocol::JsonRpcResponse;
use sb_mcp_client::sse::SseTransport;
use sb_mcp_client::{McpManager, McpTransport};

type Outbox = Arc<Mutex<Option<mpsc::UnboundedSender<Event>>>>;

async fn stream(State(outbox): State<Outbox>) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    *outbox.lock() = Some(tx);
    Sse::new(async_stream::stream! {
        yield Ok(Event::default().event("endpoint").data("/messages?session=1"));
        while let Some(event) = rx.recv().await {
            yield Ok(event);
        }
    })
}

async fn messages(State(outbox): State<Outbox>, Json(body): Json<Value>) -> StatusCode {
    let Some(id) = body.get("id").and_then(Value::as_u64) else {
        return StatusCode::ACCEPTED;
    };
    let result = match body["method"].as_str().unwrap_or_default() {
        "initialize" => json!({ "protocolVersion": "2024-11-05", "capabilities": { "tools": {} } }),
        "tools/list" => json!({
            "tools": [{ "name": "shout", "description": "Upper-case the text" }]
        }),
        "tools/call" => {
            let text = body["params"]["arguments"]["text"].as_str().unwrap_or_default();
            json!({ "content": [{ "type": "text", "text": text.to_uppercase() }] })
        }
        _ => return StatusCode::BAD_REQUEST,
    };
    let payload = serde_json::to_string(&JsonRpcResponse::success(id, result)).unwrap();
    if let Some(tx) = outbox.lock().as_ref() {
        let _ = tx.send(Event::default().event("message").data(payload));
    }
    StatusCode::ACCEPTED
}

async fn spawn_server() -> SocketAddr {
    let outbox: Outbox = Arc::new(Mutex::new(None));
    let app = Router::new()
        .route("/sse", get(stream))
        .route("/messages", post(messages))
        .with_state(outbox);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn transport_handshake_and_request() {
    let addr = spawn_server().await;
    let url = reqwest::Url::parse(&format!("http://{addr}/sse")).unwrap();

    let transport = SseTransport::connect("remote", &url, Duration::from_secs(5)).await.unwrap();
    assert!(transport.is_alive());

    let resp = transport.send_request("tools/list", None).await.unwrap();
    let tools = resp.into_result().unwrap();
    assert_eq!(tools["tools"][0]["name"], "shout");

    transport.shutdown().await;
    assert!(!transport.is_alive());
}

#[tokio::test]
async fn connect_to_dead_endpoint_fails() {
    // Bind and drop to get a port nobody listens on.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let url = reqwest::Url::parse(&format!("http://{addr}/sse")).unwrap();
    assert!(SseTransport::connect("remote", &url, Duration::from_secs(1)).await.is_err());
}

#[tokio::test]
async fn manager_over_sse() {
    let addr = spawn_server().await;
    let cfg = McpConfig {
        fetch_timeout_secs: 5,
        request_timeout_secs: 5,
        servers: vec![McpServerConfig {
            name: "remote".into(),
            transport: "sse".into(),
            command: String::new(),
            args: Vec::new(),
            url: Some(format!("http://{addr}/sse")),
            env: Default::default(),
        }],
        ..McpConfig::default()
    };
    let manager = McpManager::new(&cfg);
    manager.start();

    let tools = manager.get_tools().await;
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "remote_shout");

    let text = manager
        .call_tool("remote_shout", json!({ "text": "hello" }))
        .await
        .unwrap();
    assert_eq!(text, "HELLO");

    manager.stop().await;
}

/// Read one HTTP/1.1 request (headers plus `Content-Length` body).
async fn read_request(conn: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = conn.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed mid-request");
        raw.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&raw);
        let Some(head_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let body_len = text[..head_end]
            .lines()
            .find_map(|l| {
                let (name, value) = l.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        if raw.len() >= head_end + 4 + body_len {
            return text[head_end + 4..].to_string();
        }
    }
}

#[tokio::test]
async fn message_split_inside_a_character_arrives_intact() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request(&mut stream).await;
        stream
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\n\
                  connection: close\r\n\r\nevent: endpoint\r\ndata: /messages\r\n\r\n",
            )
            .await
            .unwrap();
        stream.flush().await.unwrap();

        let (mut post, _) = listener.accept().await.unwrap();
        let body: Value = serde_json::from_str(&read_request(&mut post).await).unwrap();
        post.write_all(b"HTTP/1.1 202 Accepted\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        post.shutdown().await.unwrap();

        let reply = JsonRpcResponse::success(body["id"].as_u64().unwrap(), json!({ "d": "café" }));
        let event = format!("event: message\r\ndata: {}\r\n\r\n", serde_json::to_string(&reply).unwrap());
        let bytes = event.as_bytes();
        // Cut after the first byte of the two-byte "é".
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;

        stream.write_all(&bytes[..split]).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        stream.write_all(&bytes[split..]).await.unwrap();
        stream.flush().await.unwrap();

        // Hold the stream open until the client goes away.
        let mut sink = [0u8; 64];
        let _ = stream.read(&mut sink).await;
    });

    let url = reqwest::Url::parse(&format!("http://{addr}/sse")).unwrap();
    let transport = SseTransport::connect("remote", &url, Duration::from_secs(5)).await.unwrap();

    let resp = transport.send_request("tools/list", None).await.unwrap();
    assert_eq!(resp.into_result().unwrap()["d"], "café");

    transport.shutdown().await;
}
