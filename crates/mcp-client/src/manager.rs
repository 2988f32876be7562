//! MCP manager: holds every managed server, supervises its connection and
//! serves the aggregated tool declarations.
//!
//! Each server has:
//! - a session slot (async mutex) touched only by that server's fetch and
//!   call paths;
//! - a supervisor task that connects, re-checks every health-check interval and
//!   backs off after a failure;
//! - at most one in-flight fetch, shared by every caller that needs it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sb_domain::config::McpConfig;
use sb_domain::tool::ToolDeclaration;

use crate::descriptor::ConnectionDescriptor;
use crate::error::McpError;
use crate::session::{Connector, McpSession, TransportConnector};

type FetchResult = Result<Vec<ToolDeclaration>, Arc<McpError>>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Supervisor state of one managed server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Disconnected,
    Connecting,
    Connected,
    HealthChecking,
    Closed,
}

struct ManagedServer {
    descriptor: ConnectionDescriptor,
    session: tokio::sync::Mutex<Option<McpSession>>,
    state: Mutex<ServerState>,
}

impl ManagedServer {
    fn new(descriptor: ConnectionDescriptor) -> Self {
        Self {
            descriptor,
            session: tokio::sync::Mutex::new(None),
            state: Mutex::new(ServerState::Disconnected),
        }
    }

    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn state(&self) -> ServerState {
        *self.state.lock()
    }

    fn set_state(&self, next: ServerState) {
        let mut state = self.state.lock();
        if *state != next {
            tracing::trace!(server = %self.descriptor.name, from = ?*state, to = ?next, "MCP server state change");
            *state = next;
        }
    }

    /// Reuse the live session or open a new one, then run `tools/list`.
    async fn fetch_tools(&self, connector: &dyn Connector) -> Result<Vec<ToolDeclaration>, McpError> {
        let mut slot = self.session.lock().await;
        let session = ensure_session(&mut slot, connector, &self.descriptor).await?;
        session.list_tools().await
    }

    /// Drop the session so the next attempt reconnects from scratch.
    async fn reset(&self) {
        if let Some(session) = self.take_session().await {
            session.close().await;
        }
    }

    async fn take_session(&self) -> Option<McpSession> {
        self.session.lock().await.take()
    }
}

async fn ensure_session<'a>(
    slot: &'a mut Option<McpSession>,
    connector: &dyn Connector,
    descriptor: &ConnectionDescriptor,
) -> Result<&'a McpSession, McpError> {
    match slot.take() {
        Some(session) if session.is_alive() => Ok(&*slot.insert(session)),
        stale => {
            if let Some(session) = stale {
                session.close().await;
            }
            let fresh = McpSession::connect(connector, descriptor).await?;
            Ok(&*slot.insert(fresh))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Closed,
}

struct Inner {
    /// Declaration order.
    servers: Vec<Arc<ManagedServer>>,
    connector: Arc<dyn Connector>,
    cache: Mutex<HashMap<String, Vec<ToolDeclaration>>>,
    in_flight: Mutex<HashMap<String, SharedFetch>>,
    updates: watch::Sender<Vec<ToolDeclaration>>,
    lifecycle: Mutex<Lifecycle>,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
    /// Detached closes of sessions retired by failed fetches.
    closers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
    backoff: Duration,
    health_check: Duration,
    fetch_timeout: Duration,
}

/// Manager that holds all MCP server connections.
///
/// Cheap to clone; clones share the same servers and cache.
#[derive(Clone)]
pub struct McpManager {
    inner: Arc<Inner>,
}

impl McpManager {
    /// Build a manager that spawns stdio servers and opens SSE streams.
    ///
    /// Invalid or duplicate entries are skipped with a warning. Nothing is
    /// connected until [`start`](Self::start).
    pub fn new(config: &McpConfig) -> Self {
        let connector = TransportConnector::new(Duration::from_secs(config.request_timeout_secs.max(1)));
        Self::with_connector(config, Arc::new(connector))
    }

    /// Build a manager that opens transports through `connector`.
    pub fn with_connector(config: &McpConfig, connector: Arc<dyn Connector>) -> Self {
        let servers: Vec<_> = ConnectionDescriptor::from_configs(&config.servers)
            .into_iter()
            .map(|d| Arc::new(ManagedServer::new(d)))
            .collect();

        tracing::debug!(
            configured = config.servers.len(),
            accepted = servers.len(),
            "MCP manager created"
        );

        let (updates, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                servers,
                connector,
                cache: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                updates,
                lifecycle: Mutex::new(Lifecycle::Idle),
                supervisors: Mutex::new(Vec::new()),
                closers: Mutex::new(Vec::new()),
                shutdown: CancellationToken::new(),
                backoff: Duration::from_secs(config.backoff_secs.max(1)),
                health_check: Duration::from_secs(config.health_check_secs.max(1)),
                fetch_timeout: Duration::from_secs(config.fetch_timeout_secs.max(1)),
            }),
        }
    }

    /// Spawn one supervisor per managed server. A second call is a no-op,
    /// as is a call after [`stop`](Self::stop).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Running => return,
            Lifecycle::Closed => {
                tracing::warn!("MCP manager already stopped, ignoring start");
                return;
            }
            Lifecycle::Idle => {}
        }

        let mut supervisors = self.inner.supervisors.lock();
        for server in &self.inner.servers {
            supervisors.push(tokio::spawn(supervise(self.inner.clone(), server.clone())));
        }
        *lifecycle = Lifecycle::Running;

        tracing::info!(servers = self.inner.servers.len(), "MCP manager started");
    }

    /// Aggregated declarations across all servers, in declaration order.
    ///
    /// Servers without cached declarations are fetched concurrently, joining
    /// any fetch already in flight. A failed fetch is logged and contributes
    /// nothing. Returns within one fetch timeout. Before `start` and after
    /// `stop` this only reads the cache.
    pub async fn get_tools(&self) -> Vec<ToolDeclaration> {
        if *self.inner.lifecycle.lock() != Lifecycle::Running {
            return self.inner.snapshot();
        }

        let uncached: Vec<Arc<ManagedServer>> = {
            let cache = self.inner.cache.lock();
            self.inner
                .servers
                .iter()
                .filter(|s| !cache.contains_key(s.name()))
                .cloned()
                .collect()
        };

        if !uncached.is_empty() {
            let fetches: Vec<SharedFetch> = uncached.iter().map(|s| self.inner.shared_fetch(s)).collect();
            futures_util::future::join_all(fetches).await;
        }
        self.inner.snapshot()
    }

    /// Receiver that sees every change to the aggregated declarations.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ToolDeclaration>> {
        self.inner.updates.subscribe()
    }

    /// Invoke a tool by its prefixed name and return the text of the result.
    ///
    /// A result flagged `isError` by the server becomes
    /// [`McpError::ToolFailed`].
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, McpError> {
        if *self.inner.lifecycle.lock() != Lifecycle::Running {
            return Err(McpError::NotRunning);
        }

        let declaration = self
            .inner
            .snapshot()
            .into_iter()
            .find(|d| d.name == name)
            .ok_or_else(|| McpError::UnknownTool(name.to_string()))?;

        let server = self
            .inner
            .servers
            .iter()
            .find(|s| s.name() == declaration.server)
            .ok_or_else(|| McpError::ServerNotFound(declaration.server.clone()))?;

        tracing::debug!(server = %declaration.server, tool = declaration.remote_name(), "calling MCP tool");

        let call = async {
            let mut slot = server.session.lock().await;
            let session = ensure_session(&mut slot, self.inner.connector.as_ref(), &server.descriptor).await?;
            session.call_tool(declaration.remote_name(), arguments).await
        };
        let result = tokio::select! {
            biased;
            _ = self.inner.shutdown.cancelled() => return Err(McpError::Cancelled),
            result = call => result?,
        };

        let text = result.joined_text();
        if result.is_error {
            return Err(McpError::ToolFailed {
                tool: name.to_string(),
                message: text,
            });
        }
        Ok(text)
    }

    /// Current supervisor state of every managed server, in declaration order.
    pub fn server_states(&self) -> Vec<(String, ServerState)> {
        self.inner
            .servers
            .iter()
            .map(|s| (s.name().to_string(), s.state()))
            .collect()
    }

    /// Names of the managed servers, in declaration order.
    pub fn server_names(&self) -> Vec<String> {
        self.inner.servers.iter().map(|s| s.name().to_string()).collect()
    }

    /// Return the number of managed servers.
    pub fn server_count(&self) -> usize {
        self.inner.servers.len()
    }

    /// Check if there are any managed servers.
    pub fn is_empty(&self) -> bool {
        self.inner.servers.is_empty()
    }

    /// Cancel every supervisor and in-flight fetch, close every transport
    /// and clear the cache. Idempotent; safe before `start`.
    pub async fn stop(&self) {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if *lifecycle == Lifecycle::Closed {
                return;
            }
            *lifecycle = Lifecycle::Closed;
        }
        self.inner.shutdown.cancel();

        let supervisors = std::mem::take(&mut *self.inner.supervisors.lock());
        for handle in supervisors {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "MCP supervisor ended abnormally");
            }
        }

        let in_flight: Vec<SharedFetch> = self.inner.in_flight.lock().drain().map(|(_, f)| f).collect();
        futures_util::future::join_all(in_flight).await;

        let closers = std::mem::take(&mut *self.inner.closers.lock());
        for handle in closers {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "MCP session close ended abnormally");
            }
        }

        let closes = self.inner.servers.iter().map(|server| async move {
            server.reset().await;
            server.set_state(ServerState::Closed);
        });
        futures_util::future::join_all(closes).await;

        self.inner.cache.lock().clear();
        self.inner.updates.send_replace(Vec::new());

        tracing::info!("MCP manager stopped");
    }

    /// Alias for [`stop`](Self::stop).
    pub async fn close(&self) {
        self.stop().await;
    }
}

impl Inner {
    /// Cached declarations in server order. When two servers produce the
    /// same prefixed name, the earlier server wins.
    fn snapshot(&self) -> Vec<ToolDeclaration> {
        let cache = self.cache.lock();
        let mut seen = HashSet::new();
        self.servers
            .iter()
            .filter_map(|s| cache.get(s.name()))
            .flat_map(|tools| tools.iter())
            .filter(|d| seen.insert(d.name.as_str()))
            .cloned()
            .collect()
    }

    /// Warn about prefixed names in `tools` that another server's cached
    /// declarations already use (`a` + `b_c` and `a_b` + `c`).
    fn warn_on_collisions(&self, server: &str, tools: &[ToolDeclaration]) {
        let cache = self.cache.lock();
        for declaration in tools {
            let clash = cache
                .iter()
                .filter(|(owner, _)| owner.as_str() != server)
                .find(|(_, cached)| cached.iter().any(|c| c.name == declaration.name));
            if let Some((owner, _)) = clash {
                tracing::warn!(
                    tool = %declaration.name,
                    server = %server,
                    other_server = %owner,
                    "MCP tool name collides with another server's tool; the first configured server wins"
                );
            }
        }
    }

    fn publish_snapshot(&self) {
        let snapshot = self.snapshot();
        self.updates.send_replace(snapshot);
    }

    /// Take the server's session out of its slot and close it on a
    /// separate task, so a slow transport shutdown never delays the fetch
    /// result. [`McpManager::stop`] waits for these closes.
    async fn retire_session(&self, server: &ManagedServer) {
        let Some(session) = server.take_session().await else {
            return;
        };
        let name = server.name().to_string();
        let handle = tokio::spawn(async move {
            session.close().await;
            tracing::trace!(server = %name, "stale MCP session closed");
        });
        let mut closers = self.closers.lock();
        closers.retain(|h| !h.is_finished());
        closers.push(handle);
    }

    /// Join the in-flight fetch for `server`, or start one.
    fn shared_fetch(self: &Arc<Self>, server: &Arc<ManagedServer>) -> SharedFetch {
        let mut in_flight = self.in_flight.lock();
        if let Some(existing) = in_flight.get(server.name()) {
            return existing.clone();
        }

        let inner = self.clone();
        let srv = server.clone();
        let task = tokio::spawn(async move {
            let result = inner.run_fetch(&srv).await;
            inner.in_flight.lock().remove(srv.name());
            result
        });

        let name = server.name().to_string();
        let fetch = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(Arc::new(McpError::Protocol(format!(
                    "fetch task for {name} failed: {e}"
                )))),
            }
        }
        .boxed()
        .shared();

        in_flight.insert(server.name().to_string(), fetch.clone());
        fetch
    }

    /// One bounded connect + `tools/list` attempt. Updates the cache on
    /// success; a failure retires the session and is logged here only.
    async fn run_fetch(&self, server: &ManagedServer) -> FetchResult {
        let name = server.name();
        let attempt = tokio::time::timeout(self.fetch_timeout, server.fetch_tools(self.connector.as_ref()));

        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(McpError::Cancelled),
            result = attempt => match result {
                Ok(result) => result,
                Err(_) => Err(McpError::FetchTimeout {
                    server: name.to_string(),
                    secs: self.fetch_timeout.as_secs(),
                }),
            },
        };

        match outcome {
            Ok(tools) if !self.shutdown.is_cancelled() => {
                tracing::debug!(server = %name, tools = tools.len(), "MCP tools fetched");
                self.warn_on_collisions(name, &tools);
                self.cache.lock().insert(name.to_string(), tools.clone());
                self.publish_snapshot();
                Ok(tools)
            }
            Ok(_) | Err(McpError::Cancelled) => Err(Arc::new(McpError::Cancelled)),
            Err(e) => {
                tracing::warn!(server = %name, error = %e, "failed to fetch MCP tools");
                self.retire_session(server).await;
                Err(Arc::new(e))
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supervisor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn supervise(inner: Arc<Inner>, server: Arc<ManagedServer>) {
    let mut announced = false;

    while !inner.shutdown.is_cancelled() {
        let probing = server.state() == ServerState::Connected;
        server.set_state(if probing {
            ServerState::HealthChecking
        } else {
            ServerState::Connecting
        });

        let wait = match inner.shared_fetch(&server).await {
            Ok(tools) => {
                server.set_state(ServerState::Connected);
                if !announced {
                    tracing::info!(server = %server.name(), tools = tools.len(), "MCP server connected");
                    announced = true;
                }
                inner.health_check
            }
            Err(_) if inner.shutdown.is_cancelled() => break,
            Err(_) => {
                // Stale cache entries stay; only the connection is retried.
                server.set_state(ServerState::Disconnected);
                announced = false;
                tracing::debug!(
                    server = %server.name(),
                    backoff_secs = inner.backoff.as_secs(),
                    "MCP server unavailable, backing off"
                );
                inner.backoff
            }
        };

        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    server.set_state(ServerState::Closed);
    tracing::trace!(server = %server.name(), "MCP supervisor exiting");
}
