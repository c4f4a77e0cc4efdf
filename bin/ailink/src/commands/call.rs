use ailink_bus::AgentBus;
use ailink_core::{Config, Paths};
use ailink_tools::{Dispatcher, ToolContext};

/// One-shot dispatch of a named operation against the shared store. This is
/// the same uniform call surface a hosting process uses.
pub async fn run(operation: &str, args: &str) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load(&paths)?;

    let params: serde_json::Value = serde_json::from_str(args)
        .map_err(|e| anyhow::anyhow!("Arguments must be a JSON object: {}", e))?;

    let bus = AgentBus::open(&config.store_path(&paths))?;
    let dispatcher = Dispatcher::with_defaults();
    let ctx = ToolContext::new(bus, config);

    let result = dispatcher.dispatch_value(operation, ctx, params).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if result["ok"] == false {
        std::process::exit(1);
    }
    Ok(())
}
