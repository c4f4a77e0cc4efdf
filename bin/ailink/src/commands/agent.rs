use ailink_agent::{PollingClient, RequestHandler};
use ailink_bus::AgentBus;
use ailink_core::{CapabilitySet, Config, Paths, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Replies to every request with its body verbatim. Handy for exercising the
/// bus from two terminals before a real worker exists.
struct EchoHandler;

#[async_trait]
impl RequestHandler for EchoHandler {
    async fn handle(&self, body: &str, _metadata: &Value) -> Result<String> {
        Ok(body.to_string())
    }
}

fn parse_capabilities(spec: &str) -> CapabilitySet {
    spec.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Register an echo agent on the bus and poll its mailbox until ctrl-c.
pub async fn run(id: &str, name: Option<&str>, capabilities: &str) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load(&paths)?;

    let bus = AgentBus::open(&config.store_path(&paths))?;
    let client = Arc::new(
        PollingClient::new(
            bus,
            id,
            name.unwrap_or(id),
            parse_capabilities(capabilities),
            Arc::new(EchoHandler),
        )
        .with_interval(Duration::from_millis(config.agent.poll_interval_ms)),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let handle = tokio::spawn(client.run_loop(shutdown_rx));

    info!(id, "Agent running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    let _ = shutdown_tx.send(());
    let _ = handle.await;
    Ok(())
}
