//! Agent service: wires the event bus, the MCP manager, a runner and a
//! history store into one command-in / response-out loop.
//!
//! Commands arrive on the bus `commands` channel, each one becomes a runner
//! turn with the current tool declarations and the recent history, and the
//! aggregated reply is published on the `responses` channel.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sb_bus::{BusError, EventBus, Handler};
use sb_domain::config::Config;
use sb_domain::error::{Error, Result};
use sb_domain::message::{Command, Message, Response, Turn};
use sb_mcp_client::McpManager;

use crate::runtime::{aggregate, heartbeat, HistoryStore, Runner, TurnInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

struct Inner {
    config: Arc<Config>,
    bus: EventBus,
    manager: McpManager,
    runner: Arc<dyn Runner>,
    history: Arc<dyn HistoryStore>,
    lifecycle: Mutex<Lifecycle>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

/// Cheap to clone; every clone drives the same service.
#[derive(Clone)]
pub struct AgentService {
    inner: Arc<Inner>,
}

impl AgentService {
    /// Build the bus and the manager from `config`. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(config: Arc<Config>, runner: Arc<dyn Runner>, history: Arc<dyn HistoryStore>) -> Self {
        let manager = McpManager::new(&config.mcp);
        Self::with_manager(config, manager, runner, history)
    }

    /// Same as [`new`](Self::new) with a caller-built manager, so a runner
    /// can hold a clone of it for tool invocation.
    pub fn with_manager(
        config: Arc<Config>,
        manager: McpManager,
        runner: Arc<dyn Runner>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        let bus = EventBus::new(&config.bus);
        Self {
            inner: Arc::new(Inner {
                config,
                bus,
                manager,
                runner,
                history,
                lifecycle: Mutex::new(Lifecycle::Idle),
                heartbeat: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn shared_config(&self) -> Arc<Config> {
        self.inner.config.clone()
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn manager(&self) -> &McpManager {
        &self.inner.manager
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Lifecycle
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Start the manager and the bus, subscribe the command handler and
    /// schedule the heartbeat. Repeated calls while running are no-ops.
    pub fn start(&self) -> std::result::Result<(), BusError> {
        let mut lifecycle = self.inner.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Running => return Ok(()),
            Lifecycle::Stopped => return Err(BusError::Stopped),
            Lifecycle::Idle => {}
        }

        let cfg = &self.inner.config;
        self.inner.manager.start();
        self.inner.bus.start()?;
        self.inner.bus.subscribe(
            &cfg.bus.commands_channel,
            CommandHandler {
                service: Arc::downgrade(&self.inner),
            },
        );

        if let Some(period) = heartbeat::interval_from_minutes(cfg.agent.heartbeat_interval_minutes) {
            let service = Arc::downgrade(&self.inner);
            let handle = heartbeat::spawn(period, self.inner.shutdown.child_token(), move || {
                let service = service.clone();
                async move {
                    if let Some(inner) = service.upgrade() {
                        AgentService { inner }.handle_command(heartbeat::heartbeat_command()).await;
                    }
                }
            });
            *self.inner.heartbeat.lock() = Some(handle);
        } else {
            tracing::info!("heartbeat disabled");
        }

        *lifecycle = Lifecycle::Running;
        tracing::info!(
            agent = %cfg.agent.name,
            commands = %cfg.bus.commands_channel,
            responses = %cfg.bus.responses_channel,
            tool_servers = self.inner.manager.server_count(),
            "agent service started"
        );
        Ok(())
    }

    /// Stop the heartbeat, then the bus, then the manager. Idempotent.
    pub async fn stop(&self) {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if *lifecycle == Lifecycle::Stopped {
                return;
            }
            *lifecycle = Lifecycle::Stopped;
        }
        tracing::info!("stopping agent service");

        self.inner.shutdown.cancel();
        let heartbeat = self.inner.heartbeat.lock().take();
        if let Some(handle) = heartbeat {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "heartbeat task ended abnormally");
            }
        }

        self.inner.bus.stop().await;
        self.inner.manager.stop().await;
        tracing::info!("agent service stopped");
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Commands
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Publish a command on the commands channel. Returns the number of
    /// work items queued (0 when nothing is subscribed or the queue is full).
    pub fn submit(&self, command: Command) -> usize {
        self.inner
            .bus
            .publish(&self.inner.config.bus.commands_channel, command.into_message())
    }

    /// Run one command through the runner and record the exchange.
    ///
    /// Nothing is published; see [`handle_command`](Self::handle_command).
    pub async fn process_command(&self, command: Command) -> Result<Response> {
        let inner = &self.inner;
        let session_id = command.source_id.as_str();
        let user_id = command.user_id.as_str();

        let history = inner
            .history
            .get_history(session_id, user_id, inner.config.agent.history_limit)
            .await?;
        let tools = inner.manager.get_tools().await;

        let input = TurnInput {
            user_id: user_id.to_owned(),
            session_id: session_id.to_owned(),
            content: command.content.clone(),
            history,
        };
        let events = inner.runner.run(input, &tools).await?;
        let (content, needs_input) = aggregate(&events);

        if let Err(e) = inner
            .history
            .append(
                session_id,
                user_id,
                vec![Turn::user(command.content.clone()), Turn::assistant(content.clone())],
            )
            .await
        {
            tracing::warn!(session_id, error = %e, "failed to record turn in history");
        }

        Ok(Response {
            source_id: command.source_id,
            user_id: command.user_id,
            content,
            needs_input,
            command_id: command.command_id,
        })
    }

    /// Process `command` and publish the reply on the responses channel.
    ///
    /// A failed run still publishes a response carrying the error text so
    /// the caller is not left waiting.
    pub async fn handle_command(&self, command: Command) {
        tracing::info!(
            source_id = %command.source_id,
            user_id = %command.user_id,
            command_id = command.command_id.as_deref().unwrap_or(""),
            "received command"
        );

        let fallback = command.clone();
        let response = match self.process_command(command).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    source_id = %fallback.source_id,
                    user_id = %fallback.user_id,
                    error = %e,
                    "command processing failed"
                );
                error_response(fallback, &e)
            }
        };

        let channel = &self.inner.config.bus.responses_channel;
        let queued = self.inner.bus.publish(channel, response.into_message());
        tracing::debug!(channel = %channel, queued, "response published");
    }
}

fn error_response(command: Command, error: &Error) -> Response {
    Response {
        source_id: command.source_id,
        user_id: command.user_id,
        content: format!("Error: {error}"),
        needs_input: false,
        command_id: command.command_id,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bus handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Subscriber on the commands channel. Holds the service weakly so the
/// bus's subscriber table does not keep it alive.
struct CommandHandler {
    service: Weak<Inner>,
}

#[async_trait]
impl Handler for CommandHandler {
    async fn handle(&self, message: Message) -> Result<()> {
        let Some(inner) = self.service.upgrade() else {
            return Ok(());
        };
        let command = Command::from_message(&message)?;
        AgentService { inner }.handle_command(command).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "agent_commands"
    }
}
