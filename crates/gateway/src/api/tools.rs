//! MCP tool endpoints.
//!
//! - `GET  /v1/tools`: aggregated declarations from every reachable server
//! - `POST /v1/tools/call`: invoke one tool by its prefixed name

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use sb_mcp_client::McpError;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    let tools = state.service.manager().get_tools().await;
    Json(serde_json::json!({
        "count": tools.len(),
        "tools": tools,
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/tools/call
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ToolCallRequest {
    /// Prefixed tool name, e.g. `"filesystem_read_file"`.
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

pub async fn call_tool(
    State(state): State<AppState>,
    Json(req): Json<ToolCallRequest>,
) -> impl IntoResponse {
    let arguments = if req.arguments.is_null() {
        serde_json::json!({})
    } else {
        req.arguments
    };

    match state.service.manager().call_tool(&req.name, arguments).await {
        Ok(content) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "ok": true,
                "tool": req.name,
                "content": content,
            })),
        ),
        Err(e) => {
            tracing::warn!(tool = %req.name, error = %e, "tool call failed");
            (
                status_for(&e),
                Json(serde_json::json!({
                    "ok": false,
                    "tool": req.name,
                    "error": e.to_string(),
                })),
            )
        }
    }
}

fn status_for(error: &McpError) -> StatusCode {
    match error {
        McpError::UnknownTool(_) | McpError::ServerNotFound(_) => StatusCode::NOT_FOUND,
        McpError::ToolFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        McpError::NotRunning | McpError::Cancelled | McpError::ServerDown(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        McpError::FetchTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        McpError::Transport(_) | McpError::Protocol(_) => StatusCode::BAD_GATEWAY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_mapping() {
        assert_eq!(status_for(&McpError::UnknownTool("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&McpError::NotRunning), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_for(&McpError::ToolFailed {
                tool: "fs_read".into(),
                message: "no such file".into()
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
