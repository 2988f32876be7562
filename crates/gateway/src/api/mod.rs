pub mod commands;
pub mod health;
pub mod responses;
pub mod tools;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router. State is attached by the caller.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health::health))
        // Bus surface
        .route("/v1/commands", post(commands::submit_command))
        .route("/v1/responses/events", get(responses::response_events_sse))
        // MCP tools
        .route("/v1/tools", get(tools::list_tools))
        .route("/v1/tools/call", post(tools::call_tool))
}
