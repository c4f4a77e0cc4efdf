use ailink_core::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::agents::{ListConnectedAisTool, RegisterAiTool};
use crate::context::{GetSharedContextTool, ShareContextTool};
use crate::message::{ReadMessagesTool, SendMessageTool};
use crate::tasks::{ClaimTaskTool, CompleteTaskTool, ListTasksTool, SubmitTaskTool};
use crate::{Tool, ToolContext};

/// A domain collaborator living behind the bus (price feed, exchange client,
/// indicator math, LLM). The dispatcher passes arguments through untouched and
/// returns whatever structured result the handler produces.
#[async_trait]
pub trait ExternalHandler: Send + Sync {
    async fn call(&self, operation: &str, params: Value) -> Result<Value>;
}

/// Routes a named operation to a built-in bus tool or a registered external
/// handler (exact name first, then longest matching prefix).
#[derive(Clone)]
pub struct Dispatcher {
    tools: HashMap<String, Arc<dyn Tool>>,
    external: HashMap<String, Arc<dyn ExternalHandler>>,
    external_prefixes: Vec<(String, Arc<dyn ExternalHandler>)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            external: HashMap::new(),
            external_prefixes: Vec::new(),
        }
    }

    /// Dispatcher with the full coordination surface registered.
    pub fn with_defaults() -> Self {
        let mut dispatcher = Self::new();

        dispatcher.register(Arc::new(RegisterAiTool));
        dispatcher.register(Arc::new(ListConnectedAisTool));
        dispatcher.register(Arc::new(SendMessageTool));
        dispatcher.register(Arc::new(ReadMessagesTool));
        dispatcher.register(Arc::new(SubmitTaskTool));
        dispatcher.register(Arc::new(ListTasksTool));
        dispatcher.register(Arc::new(ClaimTaskTool));
        dispatcher.register(Arc::new(CompleteTaskTool));
        dispatcher.register(Arc::new(ShareContextTool));
        dispatcher.register(Arc::new(GetSharedContextTool));

        dispatcher
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        debug!(name = schema.name, "Registering tool");
        self.tools.insert(schema.name.to_string(), tool);
    }

    /// Register an external handler under an exact operation name.
    pub fn register_external(&mut self, name: &str, handler: Arc<dyn ExternalHandler>) {
        debug!(name, "Registering external handler");
        self.external.insert(name.to_string(), handler);
    }

    /// Register an external handler for every operation name starting with
    /// `prefix` (e.g. "exchange_" for a whole trading client).
    pub fn register_external_prefix(&mut self, prefix: &str, handler: Arc<dyn ExternalHandler>) {
        debug!(prefix, "Registering external handler prefix");
        self.external_prefixes.push((prefix.to_string(), handler));
        // longest prefix wins on overlap
        self.external_prefixes
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn get_tool_schemas(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| {
                let schema = tool.schema();
                json!({
                    "name": schema.name,
                    "description": schema.description,
                    "parameters": schema.parameters,
                })
            })
            .collect()
    }

    /// Route one operation. Typed bus errors pass through to the caller.
    pub async fn dispatch(&self, name: &str, ctx: ToolContext, params: Value) -> Result<Value> {
        if let Some(tool) = self.tools.get(name) {
            if let Err(e) = tool.validate(&params) {
                warn!(operation = name, error = %e, "Operation validation failed");
                return Err(e);
            }
            debug!(operation = name, "Dispatching built-in operation");
            return tool.execute(ctx, params).await;
        }

        if let Some(handler) = self.external.get(name) {
            debug!(operation = name, "Dispatching to external handler");
            return handler.call(name, params).await;
        }
        if let Some((prefix, handler)) = self
            .external_prefixes
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix.as_str()))
        {
            debug!(operation = name, prefix = %prefix, "Dispatching to external prefix handler");
            return handler.call(name, params).await;
        }

        Err(Error::Tool(format!("Unknown operation: {}", name)))
    }

    /// Route one operation, folding any failure into a structured payload so
    /// that a bad call can never take down the caller's loop. Callers branch
    /// on `error.kind`, not on the message text.
    pub async fn dispatch_value(&self, name: &str, ctx: ToolContext, params: Value) -> Value {
        match self.dispatch(name, ctx, params).await {
            Ok(result) => json!({ "ok": true, "result": result }),
            Err(e) => {
                warn!(operation = name, kind = e.kind(), error = %e, "Operation failed");
                json!({
                    "ok": false,
                    "error": { "kind": e.kind(), "message": e.to_string() }
                })
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ailink_bus::AgentBus;
    use ailink_core::Config;

    fn ctx() -> ToolContext {
        ToolContext::new(AgentBus::in_memory().unwrap(), Config::default())
    }

    struct EchoHandler;

    #[async_trait]
    impl ExternalHandler for EchoHandler {
        async fn call(&self, operation: &str, params: Value) -> Result<Value> {
            Ok(json!({ "operation": operation, "params": params }))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl ExternalHandler for FailingHandler {
        async fn call(&self, _operation: &str, _params: Value) -> Result<Value> {
            Err(Error::Other("upstream exploded".to_string()))
        }
    }

    #[test]
    fn test_defaults_cover_the_operation_surface() {
        let dispatcher = Dispatcher::with_defaults();
        let names = dispatcher.tool_names();
        for op in [
            "register_ai",
            "send_message",
            "read_messages",
            "submit_task",
            "list_tasks",
            "claim_task",
            "complete_task",
            "list_connected_ais",
            "share_context",
            "get_shared_context",
        ] {
            assert!(names.contains(&op.to_string()), "missing {}", op);
        }
        assert_eq!(names.len(), 10);
    }

    #[tokio::test]
    async fn test_dispatch_builtin() {
        let dispatcher = Dispatcher::with_defaults();
        let result = dispatcher
            .dispatch(
                "register_ai",
                ctx(),
                json!({"id": "a1", "name": "Agent One"}),
            )
            .await
            .unwrap();
        assert_eq!(result["status"], "registered");
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let dispatcher = Dispatcher::with_defaults();
        let err = dispatcher
            .dispatch("launch_rockets", ctx(), json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "tool");
    }

    #[tokio::test]
    async fn test_external_exact_and_prefix() {
        let mut dispatcher = Dispatcher::with_defaults();
        dispatcher.register_external("get_price", Arc::new(EchoHandler));
        dispatcher.register_external_prefix("exchange_", Arc::new(EchoHandler));

        let exact = dispatcher
            .dispatch("get_price", ctx(), json!({"symbol": "SOL"}))
            .await
            .unwrap();
        assert_eq!(exact["operation"], "get_price");
        assert_eq!(exact["params"]["symbol"], "SOL");

        let prefixed = dispatcher
            .dispatch("exchange_place_order", ctx(), json!({}))
            .await
            .unwrap();
        assert_eq!(prefixed["operation"], "exchange_place_order");
    }

    #[tokio::test]
    async fn test_builtin_shadows_external() {
        let mut dispatcher = Dispatcher::with_defaults();
        dispatcher.register_external("list_tasks", Arc::new(EchoHandler));
        let result = dispatcher.dispatch("list_tasks", ctx(), json!({})).await.unwrap();
        // the built-in ran, not the echo
        assert_eq!(result["count"], 0);
    }

    #[tokio::test]
    async fn test_dispatch_value_folds_errors() {
        let mut dispatcher = Dispatcher::with_defaults();
        dispatcher.register_external("boom", Arc::new(FailingHandler));

        let ok = dispatcher
            .dispatch_value("list_tasks", ctx(), json!({}))
            .await;
        assert_eq!(ok["ok"], true);
        assert_eq!(ok["result"]["count"], 0);

        let failed = dispatcher.dispatch_value("boom", ctx(), json!({})).await;
        assert_eq!(failed["ok"], false);
        assert_eq!(failed["error"]["kind"], "other");

        let not_found = dispatcher
            .dispatch_value(
                "claim_task",
                ctx(),
                json!({"taskId": "task-0-missing", "id": "a1"}),
            )
            .await;
        assert_eq!(not_found["error"]["kind"], "not_found");
    }
}
