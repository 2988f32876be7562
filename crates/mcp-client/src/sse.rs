//! SSE transport: a persistent `text/event-stream` GET for server → client
//! traffic, plus one POST per client → server message.
//!
//! The server announces where to POST with an `endpoint` event (a URL
//! relative to the stream URL). JSON-RPC responses come back as `message`
//! events and are matched to their request by `id`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::transport::{McpTransport, TransportError};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Pull complete events out of `buffer`, leaving any trailing partial event.
///
/// Events are separated by a blank line (`\n\n` or `\r\n\r\n`). The
/// buffer holds raw bytes so a character split across network chunks is
/// only decoded once its event is complete. Multiple `data:` lines in one
/// event are joined with `\n`; an event without an `event:` line is a
/// `message`. Comment lines (leading `:`) and `id:`/`retry:` are ignored.
pub(crate) fn drain_events(buffer: &mut Vec<u8>) -> Vec<SseEvent> {
    let mut events = Vec::new();

    while let Some((end, next)) = event_boundary(buffer) {
        let raw: Vec<u8> = buffer.drain(..next).take(end).collect();
        let block = String::from_utf8_lossy(&raw);

        let mut event = String::new();
        let mut data: Vec<&str> = Vec::new();
        for line in block.lines().map(|l| l.trim_end_matches('\r')) {
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
                None => (line, ""),
            };
            match field {
                "event" => event = value.to_string(),
                "data" => data.push(value),
                _ => {}
            }
        }

        if data.is_empty() {
            continue;
        }
        if event.is_empty() {
            event = "message".into();
        }
        events.push(SseEvent {
            event,
            data: data.join("\n"),
        });
    }

    events
}

/// End of the first complete event block and the start of the next one.
fn event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(offset) = buffer[from..].iter().position(|&b| b == b'\n') {
        let newline = from + offset;
        match &buffer[newline + 1..] {
            [b'\n', ..] => return Some((newline, newline + 2)),
            [b'\r', b'\n', ..] => return Some((newline, newline + 3)),
            _ => from = newline + 1,
        }
    }
    None
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SseTransport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SseTransport {
    server: String,
    client: reqwest::Client,
    endpoint: Url,
    pending: Pending,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
    request_timeout: Duration,
}

impl SseTransport {
    /// Open the event stream at `url` and wait for the `endpoint` event.
    ///
    /// Waiting for the endpoint is bounded by `request_timeout`.
    pub async fn connect(server: &str, url: &Url, request_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::new();
        let response = client
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let (endpoint_tx, endpoint_rx) = oneshot::channel();

        let reader = tokio::spawn(read_events(
            server.to_owned(),
            response,
            url.clone(),
            endpoint_tx,
            pending.clone(),
            alive.clone(),
        ));

        let endpoint = match tokio::time::timeout(request_timeout, endpoint_rx).await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(_)) => {
                reader.abort();
                return Err(TransportError::StreamClosed);
            }
            Err(_) => {
                reader.abort();
                return Err(TransportError::Timeout);
            }
        };

        tracing::debug!(server, endpoint = %endpoint, "MCP SSE endpoint received");

        Ok(Self {
            server: server.to_owned(),
            client,
            endpoint,
            pending,
            next_id: AtomicU64::new(1),
            alive,
            reader: Mutex::new(Some(reader)),
            request_timeout,
        })
    }

    async fn post(&self, body: String) -> Result<(), TransportError> {
        self.client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::StreamClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let body = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        tracing::debug!(server = %self.server, id, method, "sending MCP request");
        if let Err(e) = self.post(body).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(TransportError::StreamClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(TransportError::Timeout)
            }
        }
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::StreamClosed);
        }
        let body = serde_json::to_string(&JsonRpcNotification::new(method))?;
        tracing::debug!(server = %self.server, method, "sending MCP notification");
        self.post(body).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.pending.lock().clear();
        tracing::debug!(server = %self.server, "MCP SSE stream closed");
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

/// Reader task: routes `endpoint` and `message` events until the stream ends.
async fn read_events(
    server: String,
    mut response: reqwest::Response,
    base: Url,
    endpoint_tx: oneshot::Sender<Url>,
    pending: Pending,
    alive: Arc<AtomicBool>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        match response.chunk().await {
            Ok(Some(bytes)) => {
                buffer.extend_from_slice(&bytes);
                for event in drain_events(&mut buffer) {
                    match event.event.as_str() {
                        "endpoint" => match base.join(event.data.trim()) {
                            Ok(url) => {
                                if let Some(tx) = endpoint_tx.take() {
                                    let _ = tx.send(url);
                                }
                            }
                            Err(e) => {
                                tracing::warn!(server = %server, error = %e, data = %event.data, "unusable MCP SSE endpoint");
                            }
                        },
                        "message" => match serde_json::from_str::<JsonRpcResponse>(&event.data) {
                            Ok(resp) => {
                                let waiter = pending.lock().remove(&resp.id);
                                match waiter {
                                    Some(tx) => {
                                        let _ = tx.send(resp);
                                    }
                                    None => {
                                        tracing::debug!(server = %server, id = resp.id, "response for unknown request id");
                                    }
                                }
                            }
                            Err(_) => {
                                tracing::debug!(server = %server, data = %event.data, "skipping non-response MCP message");
                            }
                        },
                        other => {
                            tracing::debug!(server = %server, event = other, "ignoring MCP SSE event");
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(server = %server, error = %e, "MCP SSE stream failed");
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    // Dropping the senders wakes every waiting request with StreamClosed.
    pending.lock().clear();
    tracing::debug!(server = %server, "MCP SSE reader exiting");
}
