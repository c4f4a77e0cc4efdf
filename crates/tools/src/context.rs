use ailink_core::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::{Tool, ToolContext, ToolSchema};

pub struct ShareContextTool;

#[async_trait]
impl Tool for ShareContextTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "share_context",
            description: "Publish (or overwrite) a named shared-context blob, optionally restricted to an agent allowlist and/or a TTL in seconds.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "contextId": {
                        "type": "string",
                        "description": "Context name"
                    },
                    "data": {
                        "description": "Arbitrary JSON payload"
                    },
                    "authorizedIds": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Agent ids allowed to read. Empty or omitted means public."
                    },
                    "ttlSeconds": {
                        "type": "integer",
                        "description": "Seconds until the entry expires. Omitted means it never expires."
                    }
                },
                "required": ["contextId", "data"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("contextId").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation(
                "Missing required parameter: contextId".to_string(),
            ));
        }
        if params.get("data").is_none() {
            return Err(Error::Validation("Missing required parameter: data".to_string()));
        }
        if let Some(ids) = params.get("authorizedIds") {
            if !ids.is_null() && ids.as_array().map_or(true, |a| a.iter().any(|v| !v.is_string())) {
                return Err(Error::Validation(
                    "Parameter authorizedIds must be an array of strings".to_string(),
                ));
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let context_id = params["contextId"].as_str().unwrap();
        let data = params["data"].clone();
        let authorized_ids: BTreeSet<String> = params
            .get("authorizedIds")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let ttl_seconds = params.get("ttlSeconds").and_then(|v| v.as_i64());

        let entry = ctx.bus.contexts.share(context_id, data, authorized_ids, ttl_seconds)?;
        Ok(json!({
            "status": "shared",
            "contextId": entry.id,
            "expiresAt": entry.expires_at,
        }))
    }
}

pub struct GetSharedContextTool;

#[async_trait]
impl Tool for GetSharedContextTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_shared_context",
            description: "Read a shared-context blob. Fails unauthorized on ACL violation and expired once the TTL has passed.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "contextId": {
                        "type": "string",
                        "description": "Context name"
                    },
                    "requesterId": {
                        "type": "string",
                        "description": "Agent id asking for the data (checked against the allowlist)"
                    }
                },
                "required": ["contextId", "requesterId"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        for key in ["contextId", "requesterId"] {
            if params.get(key).and_then(|v| v.as_str()).is_none() {
                return Err(Error::Validation(format!("Missing required parameter: {}", key)));
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let context_id = params["contextId"].as_str().unwrap();
        let requester_id = params["requesterId"].as_str().unwrap();

        let data = ctx.bus.contexts.get(context_id, requester_id)?;
        Ok(json!({
            "contextId": context_id,
            "data": data,
        }))
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

    #[tokio::test]
    async fn test_share_and_get_with_acl() {
        let ctx = ctx();
        ShareContextTool
            .execute(
                ctx.clone(),
                json!({
                    "contextId": "hw-state",
                    "data": {"armed": true},
                    "authorizedIds": ["a1"],
                    "ttlSeconds": 3600
                }),
            )
            .await
            .unwrap();

        let ok = GetSharedContextTool
            .execute(ctx.clone(), json!({"contextId": "hw-state", "requesterId": "a1"}))
            .await
            .unwrap();
        assert_eq!(ok["data"]["armed"], true);

        let err = GetSharedContextTool
            .execute(ctx.clone(), json!({"contextId": "hw-state", "requesterId": "a2"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unauthorized");

        let err = GetSharedContextTool
            .execute(ctx, json!({"contextId": "missing", "requesterId": "a1"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_expired_then_reshared() {
        let ctx = ctx();
        ShareContextTool
            .execute(
                ctx.clone(),
                json!({"contextId": "c", "data": 1, "ttlSeconds": -1}),
            )
            .await
            .unwrap();
        let err = GetSharedContextTool
            .execute(ctx.clone(), json!({"contextId": "c", "requesterId": "a1"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "expired");

        ShareContextTool
            .execute(ctx.clone(), json!({"contextId": "c", "data": 2}))
            .await
            .unwrap();
        let ok = GetSharedContextTool
            .execute(ctx, json!({"contextId": "c", "requesterId": "a1"}))
            .await
            .unwrap();
        assert_eq!(ok["data"], 2);
    }

    #[test]
    fn test_share_validate() {
        let tool = ShareContextTool;
        assert!(tool.validate(&json!({"contextId": "c", "data": {}})).is_ok());
        assert!(tool.validate(&json!({"contextId": "c"})).is_err());
        assert!(tool
            .validate(&json!({"contextId": "c", "data": 1, "authorizedIds": "a1"}))
            .is_err());
    }
}
