//! Bus message envelopes.
//!
//! On the bus every payload is an opaque, depth-1 JSON object. The agent
//! service reads and writes two well-known shapes on top of it:
//! [`Command`] on the commands channel and [`Response`] on the responses
//! channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque key/value payload handed unchanged to every subscriber.
pub type Message = serde_json::Map<String, Value>;

/// Marker a model can put in its text to ask the caller for more input.
pub const NEEDS_INPUT_MARKER: &str = "[NEEDS_INPUT]";

/// Inbound command: `{source_id, user_id, content}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(default = "d_default")]
    pub source_id: String,
    #[serde(default = "d_default")]
    pub user_id: String,
    #[serde(default)]
    pub content: String,
    /// Correlation id assigned by the inbound surface, echoed on the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
}

impl Command {
    pub fn new(
        source_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            user_id: user_id.into(),
            content: content.into(),
            command_id: None,
        }
    }

    /// Read a command out of a bus message.
    ///
    /// Missing ids fall back to `"default"` and missing content to `""`;
    /// fields of the wrong type are an error.
    pub fn from_message(message: &Message) -> crate::error::Result<Self> {
        Ok(serde_json::from_value(Value::Object(message.clone()))?)
    }

    pub fn into_message(self) -> Message {
        to_message(&self)
    }
}

/// Outbound response: `{source_id, user_id, content, needs_input}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub source_id: String,
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub needs_input: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
}

impl Response {
    pub fn from_message(message: &Message) -> crate::error::Result<Self> {
        Ok(serde_json::from_value(Value::Object(message.clone()))?)
    }

    pub fn into_message(self) -> Message {
        to_message(&self)
    }
}

/// One prior turn of a conversation, as kept by a history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

fn to_message<T: Serialize>(value: &T) -> Message {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Message::new(),
    }
}

fn d_default() -> String {
    "default".into()
}
