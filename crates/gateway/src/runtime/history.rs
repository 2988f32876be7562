//! Conversation history.
//!
//! The service only needs two operations: read the last N turns of a
//! session and append new ones. Durable stores live outside this crate and
//! plug in through [`HistoryStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use sb_domain::error::Result;
use sb_domain::message::Turn;

#[async_trait]
pub trait HistoryStore: Send + Sync + 'static {
    /// Up to `limit` most recent turns for the session, oldest first.
    async fn get_history(&self, session_id: &str, user_id: &str, limit: usize) -> Result<Vec<Turn>>;

    /// Append turns to the end of the session.
    async fn append(&self, session_id: &str, user_id: &str, turns: Vec<Turn>) -> Result<()>;
}

/// Process-local store keyed on `(session_id, user_id)`.
///
/// Each conversation keeps at most `max_turns` turns; older ones are
/// discarded as new ones arrive.
pub struct InMemoryHistoryStore {
    max_turns: usize,
    sessions: RwLock<HashMap<(String, String), Vec<Turn>>>,
}

impl InMemoryHistoryStore {
    pub const DEFAULT_MAX_TURNS: usize = 200;

    pub fn new() -> Self {
        Self::with_max_turns(Self::DEFAULT_MAX_TURNS)
    }

    pub fn with_max_turns(max_turns: usize) -> Self {
        Self {
            max_turns: max_turns.max(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of conversations with at least one turn.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get_history(&self, session_id: &str, user_id: &str, limit: usize) -> Result<Vec<Turn>> {
        let sessions = self.sessions.read();
        let key = (session_id.to_owned(), user_id.to_owned());
        let Some(turns) = sessions.get(&key) else {
            return Ok(Vec::new());
        };
        let start = turns.len().saturating_sub(limit);
        Ok(turns[start..].to_vec())
    }

    async fn append(&self, session_id: &str, user_id: &str, turns: Vec<Turn>) -> Result<()> {
        if turns.is_empty() {
            return Ok(());
        }
        let mut sessions = self.sessions.write();
        let entry = sessions
            .entry((session_id.to_owned(), user_id.to_owned()))
            .or_default();
        entry.extend(turns);
        if entry.len() > self.max_turns {
            let excess = entry.len() - self.max_turns;
            entry.drain(..excess);
        }
        Ok(())
    }
}
