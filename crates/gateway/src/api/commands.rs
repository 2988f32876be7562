//! Inbound command endpoint.
//!
//! `POST /v1/commands` is the HTTP face of the bus `commands` channel: the
//! body is published as-is (plus a fresh `command_id`) and the caller gets
//! the reply later on `GET /v1/responses/events`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use sb_domain::message::Command;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub content: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/commands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn submit_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> impl IntoResponse {
    let command_id = Uuid::new_v4().to_string();
    let mut command = Command::new(
        req.source_id.unwrap_or_else(|| "default".into()),
        req.user_id.unwrap_or_else(|| "default".into()),
        req.content,
    );
    command.command_id = Some(command_id.clone());

    let queued = state.service.submit(command);
    if queued == 0 {
        tracing::warn!(command_id = %command_id, "command not queued");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "accepted": false,
                "command_id": command_id,
                "error": "command queue unavailable",
            })),
        );
    }

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "accepted": true,
            "command_id": command_id,
        })),
    )
}
