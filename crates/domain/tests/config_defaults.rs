use sb_domain::config::Config;

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 3210);
}

#[test]
fn default_bus_is_generous() {
    let config = Config::default();
    assert_eq!(config.bus.workers, 256);
    assert_eq!(config.bus.queue_capacity, 1024);
    assert_eq!(config.bus.commands_channel, "commands");
    assert_eq!(config.bus.responses_channel, "responses");
}

#[test]
fn empty_file_parses_to_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert!(config.mcp.servers.is_empty());
    assert_eq!(config.agent.history_limit, 10);
    assert!((config.agent.heartbeat_interval_minutes - 5.0).abs() < f64::EPSILON);
}

#[test]
fn mcp_servers_keep_declaration_order() {
    let toml_str = r#"
[mcp]
backoff_secs = 1

[[mcp.servers]]
name = "zeta"
command = "zeta-server"

[[mcp.servers]]
name = "alpha"
transport = "sse"
url = "http://localhost:9000/sse"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.mcp.backoff_secs, 1);
    let names: Vec<_> = config.mcp.servers.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["zeta", "alpha"]);
    assert_eq!(config.mcp.servers[1].transport, "sse");
}

#[test]
fn unknown_transport_does_not_break_parsing() {
    let toml_str = r#"
[[mcp.servers]]
name = "odd"
transport = "websocket"
url = "ws://localhost"

[[mcp.servers]]
name = "ok"
command = "echo"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.mcp.servers.len(), 2);
    let issues = config.validate();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].message.contains("unknown MCP server type"));
}
