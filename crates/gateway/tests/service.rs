//! Agent service end to end over the bus: commands in, responses out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

use sb_domain::config::Config;
use sb_domain::error::{Error, Result};
use sb_domain::message::{Command, Message, Response};
use sb_domain::tool::ToolDeclaration;
use sb_gateway::runtime::{InMemoryHistoryStore, Runner, RunnerEvent, TurnInput, REQUEST_USER_INPUT};
use sb_gateway::AgentService;

/// Replays a fixed script and records what it was given.
struct ScriptedRunner {
    script: std::result::Result<Vec<RunnerEvent>, String>,
    seen: Mutex<Vec<TurnInput>>,
}

impl ScriptedRunner {
    fn replying(events: Vec<RunnerEvent>) -> Arc<Self> {
        Arc::new(Self {
            script: Ok(events),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Err(message.into()),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Runner for ScriptedRunner {
    async fn run(&self, input: TurnInput, _tools: &[ToolDeclaration]) -> Result<Vec<RunnerEvent>> {
        self.seen.lock().push(input);
        self.script.clone().map_err(Error::Runner)
    }
}

fn config(heartbeat_minutes: f64) -> Arc<Config> {
    let mut config = Config::default();
    config.bus.workers = 2;
    config.bus.queue_capacity = 16;
    config.agent.heartbeat_interval_minutes = heartbeat_minutes;
    Arc::new(config)
}

/// Start `service` with a collector on the responses channel.
fn start_collecting(service: &AgentService) -> mpsc::UnboundedReceiver<Response> {
    let (tx, rx) = mpsc::unbounded_channel();
    service.bus().subscribe("responses", move |msg: Message| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(Response::from_message(&msg)?);
            Ok::<_, Error>(())
        }
    });
    service.start().unwrap();
    rx
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Response>) -> Response {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no response within 5s")
        .expect("responses channel closed")
}

#[tokio::test]
async fn command_on_bus_yields_aggregated_response() {
    let runner = ScriptedRunner::replying(vec![
        RunnerEvent::Text("Sure. ".into()),
        RunnerEvent::ToolCall {
            name: REQUEST_USER_INPUT.into(),
            args: json!({ "question": "Which branch?" }),
        },
    ]);
    let service = AgentService::new(config(0.0), runner.clone(), Arc::new(InMemoryHistoryStore::new()));
    let mut rx = start_collecting(&service);

    let mut cmd = Command::new("tg-7", "alice", "deploy it");
    cmd.command_id = Some("abc".into());
    assert_eq!(service.submit(cmd), 1);

    let response = next(&mut rx).await;
    assert_eq!(response.source_id, "tg-7");
    assert_eq!(response.user_id, "alice");
    assert_eq!(response.content, "Sure.\nWhich branch?");
    assert!(response.needs_input);
    assert_eq!(response.command_id.as_deref(), Some("abc"));

    service.stop().await;
}

#[tokio::test]
async fn missing_ids_default_and_history_accumulates() {
    let runner = ScriptedRunner::replying(vec![RunnerEvent::Text("ok".into())]);
    let service = AgentService::new(config(0.0), runner.clone(), Arc::new(InMemoryHistoryStore::new()));
    let mut rx = start_collecting(&service);

    let mut bare = Message::new();
    bare.insert("content".into(), json!("first"));
    service.bus().publish("commands", bare.clone());
    let first = next(&mut rx).await;
    assert_eq!(first.source_id, "default");
    assert_eq!(first.user_id, "default");

    bare.insert("content".into(), json!("second"));
    service.bus().publish("commands", bare);
    next(&mut rx).await;

    let seen = runner.seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].history.is_empty());
    // user + assistant turn from the first exchange
    assert_eq!(seen[1].history.len(), 2);
    assert_eq!(seen[1].history[0].content, "first");
    assert_eq!(seen[1].history[1].content, "ok");
    drop(seen);

    service.stop().await;
}

#[tokio::test]
async fn runner_failure_still_answers() {
    let service = AgentService::new(
        config(0.0),
        ScriptedRunner::failing("model offline"),
        Arc::new(InMemoryHistoryStore::new()),
    );
    let mut rx = start_collecting(&service);

    service.submit(Command::new("s", "u", "hello"));
    let response = next(&mut rx).await;
    assert_eq!(response.source_id, "s");
    assert!(response.content.contains("model offline"));
    assert!(!response.needs_input);

    service.stop().await;
}

#[tokio::test]
async fn malformed_command_is_isolated() {
    let runner = ScriptedRunner::replying(vec![RunnerEvent::Text("fine".into())]);
    let service = AgentService::new(config(0.0), runner.clone(), Arc::new(InMemoryHistoryStore::new()));
    let mut rx = start_collecting(&service);

    let mut bad = Message::new();
    bad.insert("content".into(), json!(42));
    service.bus().publish("commands", bad);
    service.submit(Command::new("s", "u", "good"));

    let response = next(&mut rx).await;
    assert_eq!(response.content, "fine");
    assert_eq!(runner.seen.lock().len(), 1);

    service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn heartbeat_runs_synthetic_command() {
    let runner = ScriptedRunner::replying(vec![RunnerEvent::Text("nothing pending".into())]);
    let service = AgentService::new(config(1.0), runner.clone(), Arc::new(InMemoryHistoryStore::new()));
    let mut rx = start_collecting(&service);

    let response = tokio::time::timeout(Duration::from_secs(90), rx.recv())
        .await
        .expect("heartbeat did not fire")
        .unwrap();
    assert_eq!(response.source_id, "system_heartbeat");
    assert_eq!(response.user_id, "system");

    let seen = runner.seen.lock().clone();
    assert!(seen[0].content.starts_with("Heartbeat trigger"));

    service.stop().await;
}

#[tokio::test]
async fn stop_is_prompt_and_final() {
    let service = AgentService::new(
        config(5.0),
        ScriptedRunner::replying(Vec::new()),
        Arc::new(InMemoryHistoryStore::new()),
    );
    service.start().unwrap();

    tokio::time::timeout(Duration::from_secs(1), service.stop())
        .await
        .expect("stop took longer than 1s");
    assert_eq!(service.submit(Command::new("s", "u", "late")), 0);
    assert!(service.manager().get_tools().await.is_empty());
}
