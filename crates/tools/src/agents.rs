use ailink_core::{CapabilitySet, Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{Tool, ToolContext, ToolSchema};

/// Extract an optional string-array parameter into a capability set.
pub(crate) fn capability_set_param(params: &Value, key: &str) -> Result<CapabilitySet> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(CapabilitySet::new()),
        Some(Value::Array(items)) => {
            let mut set = CapabilitySet::new();
            for item in items {
                let tag = item.as_str().ok_or_else(|| {
                    Error::Validation(format!("Parameter {} must be an array of strings", key))
                })?;
                set.insert(tag);
            }
            Ok(set)
        }
        Some(_) => Err(Error::Validation(format!(
            "Parameter {} must be an array of strings",
            key
        ))),
    }
}

pub struct RegisterAiTool;

#[async_trait]
impl Tool for RegisterAiTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "register_ai",
            description: "Register (or re-announce) an agent with its capability tags. Registration is an idempotent upsert keyed by id.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "string",
                        "description": "Unique agent id"
                    },
                    "name": {
                        "type": "string",
                        "description": "Human-readable display name"
                    },
                    "capabilities": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Capability tags this agent can serve (e.g. price, arbitrage-execution)"
                    },
                    "metadata": {
                        "type": "object",
                        "description": "Arbitrary agent metadata"
                    }
                },
                "required": ["id", "name"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("id").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation("Missing required parameter: id".to_string()));
        }
        if params.get("name").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation("Missing required parameter: name".to_string()));
        }
        capability_set_param(params, "capabilities")?;
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let id = params["id"].as_str().unwrap();
        let name = params["name"].as_str().unwrap();
        let capabilities = capability_set_param(&params, "capabilities")?;
        let metadata = params.get("metadata").cloned().unwrap_or(Value::Null);

        let record = ctx.bus.registry.register(id, name, capabilities, metadata)?;
        Ok(json!({
            "status": "registered",
            "id": record.id,
            "capabilities": record.capabilities,
        }))
    }
}

pub struct ListConnectedAisTool;

#[async_trait]
impl Tool for ListConnectedAisTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "list_connected_ais",
            description: "List registered agents, optionally only those carrying an exact capability tag.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "filterByCapability": {
                        "type": "string",
                        "description": "Only return agents whose capability set contains this exact tag (case-sensitive)"
                    }
                },
                "required": []
            }),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let filter = params.get("filterByCapability").and_then(|v| v.as_str());
        let agents = ctx.bus.registry.list(filter)?;
        Ok(json!({
            "count": agents.len(),
            "agents": agents,
        }))
    }
}
