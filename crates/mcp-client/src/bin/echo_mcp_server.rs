//! Minimal stdio MCP server used by the integration tests and for local
//! smoke-testing a `[[mcp.servers]]` entry.
//!
//! Tools:
//! - `echo`: returns the `text` argument unchanged.
//! - `reverse`: returns the `text` argument reversed.
//!
//! `--noisy` writes a non-JSON banner to stdout before serving, the way
//! misbehaving servers do.

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use sb_mcp_client::protocol::{
    JsonRpcResponse, ToolCallParams, ToolCallResult, INVALID_PARAMS, METHOD_NOT_FOUND, PROTOCOL_VERSION,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    if std::env::args().any(|a| a == "--noisy") {
        stdout.write_all(b"echo-mcp-server starting up\n").await?;
        stdout.flush().await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            eprintln!("echo-mcp-server: ignoring unparsable line");
            continue;
        };
        // Notifications carry no id and get no reply.
        let Some(id) = message.get("id").and_then(Value::as_u64) else {
            continue;
        };
        let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        let response = handle(id, method, params);
        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

fn handle(id: u64, method: &str, params: Value) -> JsonRpcResponse {
    match method {
        "initialize" => JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "echo-mcp-server", "version": env!("CARGO_PKG_VERSION") }
            }),
        ),
        "tools/list" => JsonRpcResponse::success(
            id,
            json!({
                "tools": [
                    {
                        "name": "echo",
                        "description": "Return the text argument unchanged",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "text": { "type": "string" } },
                            "required": ["text"]
                        }
                    },
                    {
                        "name": "reverse",
                        "description": "Return the text argument reversed",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "text": { "type": "string" } },
                            "required": ["text"]
                        }
                    }
                ]
            }),
        ),
        "tools/call" => {
            let call: ToolCallParams = match serde_json::from_value(params) {
                Ok(call) => call,
                Err(e) => return JsonRpcResponse::failure(id, INVALID_PARAMS, e.to_string()),
            };
            let text = call.arguments.get("text").and_then(Value::as_str).unwrap_or_default();
            let result = match call.name.as_str() {
                "echo" => ToolCallResult::text(text),
                "reverse" => ToolCallResult::text(text.chars().rev().collect::<String>()),
                other => {
                    let mut result = ToolCallResult::text(format!("no such tool: {other}"));
                    result.is_error = true;
                    result
                }
            };
            match serde_json::to_value(result) {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(e) => JsonRpcResponse::failure(id, INVALID_PARAMS, e.to_string()),
            }
        }
        other => JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("method not found: {other}")),
    }
}
