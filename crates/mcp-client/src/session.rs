//! An initialized MCP session on top of a transport, and the connector
//! that opens one per descriptor.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use sb_domain::tool::ToolDeclaration;

use crate::descriptor::{ConnectionDescriptor, Transport};
use crate::error::McpError;
use crate::protocol::{self, JsonRpcResponse, ToolCallResult, ToolsListResult};
use crate::sse::SseTransport;
use crate::transport::{McpTransport, StdioTransport};

/// Upper bound on `tools/list` pages followed for one fetch.
const MAX_LIST_PAGES: usize = 64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connector
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Opens a raw transport for a descriptor.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn McpTransport>, McpError>;
}

/// Spawns stdio servers and opens SSE streams.
pub struct TransportConnector {
    request_timeout: Duration,
}

impl TransportConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl Connector for TransportConnector {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn McpTransport>, McpError> {
        let transport: Box<dyn McpTransport> = match &descriptor.transport {
            Transport::Stdio { command, args, env } => Box::new(StdioTransport::spawn(
                &descriptor.name,
                command,
                args,
                env,
                self.request_timeout,
            )?),
            Transport::Sse { url } => {
                Box::new(SseTransport::connect(&descriptor.name, url, self.request_timeout).await?)
            }
        };
        Ok(transport)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpSession
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A transport that has completed the `initialize` handshake.
pub struct McpSession {
    server: String,
    transport: Box<dyn McpTransport>,
}

impl McpSession {
    /// Connect through `connector` and run the handshake.
    pub async fn connect(connector: &dyn Connector, descriptor: &ConnectionDescriptor) -> Result<Self, McpError> {
        tracing::debug!(
            server = %descriptor.name,
            transport = descriptor.transport.kind(),
            "connecting to MCP server"
        );
        let transport = connector.connect(descriptor).await?;
        match Self::initialize(&descriptor.name, transport.as_ref()).await {
            Ok(()) => Ok(Self {
                server: descriptor.name.clone(),
                transport,
            }),
            Err(e) => {
                transport.shutdown().await;
                Err(e)
            }
        }
    }

    async fn initialize(server: &str, transport: &dyn McpTransport) -> Result<(), McpError> {
        let params = serde_json::to_value(protocol::initialize_params())
            .map_err(|e| McpError::Protocol(format!("failed to serialize initialize params: {e}")))?;

        let resp = transport.send_request("initialize", Some(params)).await?;
        into_result(resp, "initialize")?;
        tracing::debug!(server, "MCP initialize response received");

        transport.send_notification("notifications/initialized").await?;
        Ok(())
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    /// Discover tools via `tools/list`, following pagination cursors.
    ///
    /// Declarations keep the order the server reported and carry the
    /// `{server}_` prefix.
    pub async fn list_tools(&self) -> Result<Vec<ToolDeclaration>, McpError> {
        let mut declarations = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let resp = self.transport.send_request("tools/list", params).await?;
            let page: ToolsListResult = serde_json::from_value(into_result(resp, "tools/list")?)
                .map_err(|e| McpError::Protocol(format!("failed to parse tools/list result: {e}")))?;

            declarations.extend(
                page.tools
                    .into_iter()
                    .map(|t| ToolDeclaration::new(&self.server, &t.name, t.description, t.input_schema)),
            );

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(declarations),
            }
        }

        tracing::warn!(server = %self.server, pages = MAX_LIST_PAGES, "tools/list pagination limit reached");
        Ok(declarations)
    }

    /// Invoke `tool` (the server's own, unprefixed name).
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        if !self.transport.is_alive() {
            return Err(McpError::ServerDown(self.server.clone()));
        }

        let params = serde_json::json!({
            "name": tool,
            "arguments": arguments
        });
        let resp = self.transport.send_request("tools/call", Some(params)).await?;
        serde_json::from_value::<ToolCallResult>(into_result(resp, "tools/call")?)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools/call result: {e}")))
    }

    /// Shut the transport down.
    pub async fn close(self) {
        tracing::debug!(server = %self.server, "closing MCP session");
        self.transport.shutdown().await;
    }
}

fn into_result(resp: JsonRpcResponse, method: &str) -> Result<Value, McpError> {
    resp.into_result()
        .map_err(|err| McpError::Protocol(format!("{method} failed: {err}")))
}
