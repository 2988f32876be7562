//! `switchboard tools`: connect once, list every declaration, disconnect.

use sb_domain::config::Config;
use sb_mcp_client::McpManager;

pub async fn list(config: &Config, json: bool) -> anyhow::Result<()> {
    let manager = McpManager::new(&config.mcp);
    if manager.is_empty() {
        eprintln!("No usable MCP servers configured.");
        return Ok(());
    }

    manager.start();
    let tools = manager.get_tools().await;
    let states = manager.server_states();
    manager.stop().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }

    for (name, state) in &states {
        let count = tools.iter().filter(|t| &t.server == name).count();
        println!("{name} ({state:?}): {count} tool(s)");
    }
    if !tools.is_empty() {
        println!();
    }
    let width = tools.iter().map(|t| t.name.len()).max().unwrap_or(0);
    for tool in &tools {
        let summary = tool.description.lines().next().unwrap_or("");
        println!("  {:<width$}  {summary}", tool.name);
    }
    Ok(())
}
