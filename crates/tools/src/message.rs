use ailink_core::{Error, MessageKind, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{Tool, ToolContext, ToolSchema};

pub struct SendMessageTool;

#[async_trait]
impl Tool for SendMessageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "send_message",
            description: "Append a message to another agent's mailbox. Fails with not_found when the recipient is not registered.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "from": {
                        "type": "string",
                        "description": "Sender agent id"
                    },
                    "to": {
                        "type": "string",
                        "description": "Recipient agent id (must be registered)"
                    },
                    "body": {
                        "type": "string",
                        "description": "Message body"
                    },
                    "kind": {
                        "type": "string",
                        "enum": ["request", "response", "notification", "data"],
                        "description": "Message kind (default: data). A request must eventually produce exactly one response."
                    },
                    "metadata": {
                        "type": "object",
                        "description": "Arbitrary metadata carried verbatim"
                    }
                },
                "required": ["from", "to", "body"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        for key in ["from", "to", "body"] {
            if params.get(key).and_then(|v| v.as_str()).is_none() {
                return Err(Error::Validation(format!("Missing required parameter: {}", key)));
            }
        }
        if let Some(kind) = params.get("kind").and_then(|v| v.as_str()) {
            if MessageKind::parse(kind).is_none() {
                return Err(Error::Validation(format!("Unknown message kind: {}", kind)));
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let from = params["from"].as_str().unwrap();
        let to = params["to"].as_str().unwrap();
        let body = params["body"].as_str().unwrap();
        let kind = params
            .get("kind")
            .and_then(|v| v.as_str())
            .and_then(MessageKind::parse)
            .unwrap_or(MessageKind::Data);
        let metadata = params.get("metadata").cloned().unwrap_or(Value::Null);

        let msg = ctx.bus.mailbox.send(from, to, body, kind, metadata)?;
        Ok(json!({
            "status": "sent",
            "sequenceId": msg.seq,
            "to": msg.to,
            "kind": msg.kind,
        }))
    }
}

pub struct ReadMessagesTool;

#[async_trait]
impl Tool for ReadMessagesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "read_messages",
            description: "Fetch messages addressed to an agent in send order. With markAsRead, the returned snapshot is flipped to read before the call returns.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "string",
                        "description": "Recipient agent id whose mailbox to read"
                    },
                    "unreadOnly": {
                        "type": "boolean",
                        "description": "Only return unread messages (default: true)"
                    },
                    "markAsRead": {
                        "type": "boolean",
                        "description": "Mark the returned messages as read (default: true)"
                    }
                },
                "required": ["id"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("id").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation("Missing required parameter: id".to_string()));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let id = params["id"].as_str().unwrap();
        let unread_only = params.get("unreadOnly").and_then(|v| v.as_bool()).unwrap_or(true);
        let mark_as_read = params.get("markAsRead").and_then(|v| v.as_bool()).unwrap_or(true);

        let messages = ctx.bus.mailbox.read(id, unread_only, mark_as_read)?;
        Ok(json!({
            "count": messages.len(),
            "messages": messages,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::RegisterAiTool;
    use ailink_bus::AgentBus;
    use ailink_core::Config;

    async fn ctx_with_agents() -> ToolContext {
        let ctx = ToolContext::new(AgentBus::in_memory().unwrap(), Config::default());
        for id in ["a1", "a2"] {
            RegisterAiTool
                .execute(ctx.clone(), json!({"id": id, "name": id}))
                .await
                .unwrap();
        }
        ctx
    }

    #[test]
    fn test_send_validate() {
        let tool = SendMessageTool;
        assert!(tool.validate(&json!({"from": "a", "to": "b", "body": "x"})).is_ok());
        assert!(tool.validate(&json!({"from": "a", "to": "b"})).is_err());
        assert!(tool
            .validate(&json!({"from": "a", "to": "b", "body": "x", "kind": "broadcast"}))
            .is_err());
    }

    #[tokio::test]
    async fn test_send_then_read_exactly_once() {
        let ctx = ctx_with_agents().await;
        SendMessageTool
            .execute(
                ctx.clone(),
                json!({"from": "a1", "to": "a2", "body": "ping", "kind": "request"}),
            )
            .await
            .unwrap();

        let first = ReadMessagesTool
            .execute(ctx.clone(), json!({"id": "a2"}))
            .await
            .unwrap();
        assert_eq!(first["count"], 1);
        assert_eq!(first["messages"][0]["body"], "ping");
        assert_eq!(first["messages"][0]["kind"], "request");

        let second = ReadMessagesTool
            .execute(ctx, json!({"id": "a2"}))
            .await
            .unwrap();
        assert_eq!(second["count"], 0);
    }

    #[tokio::test]
    async fn test_send_to_unknown_recipient() {
        let ctx = ctx_with_agents().await;
        let err = SendMessageTool
            .execute(
                ctx,
                json!({"from": "user", "to": "nonexistent", "body": "hello"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
