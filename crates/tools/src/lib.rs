pub mod agents;
pub mod context;
pub mod dispatcher;
pub mod message;
pub mod tasks;

use ailink_bus::AgentBus;
use ailink_core::{Config, Result};
use async_trait::async_trait;
use serde_json::Value;

pub use dispatcher::{Dispatcher, ExternalHandler};

/// Context handed to every operation: the bus handle plus process config.
#[derive(Clone)]
pub struct ToolContext {
    pub bus: AgentBus,
    pub config: Config,
}

impl ToolContext {
    pub fn new(bus: AgentBus, config: Config) -> Self {
        Self { bus, config }
    }
}

pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// A named bus operation. Built-in operations cover the coordination surface;
/// domain tools (price feeds, exchange clients, LLM calls) plug in behind the
/// dispatcher as external handlers instead.
#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    fn validate(&self, params: &Value) -> Result<()>;
    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value>;
}
