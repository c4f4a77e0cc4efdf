use ailink_core::{Error, Result, TaskStatus};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agents::capability_set_param;
use crate::{Tool, ToolContext, ToolSchema};

pub struct SubmitTaskTool;

#[async_trait]
impl Tool for SubmitTaskTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "submit_task",
            description: "Submit a unit of work to the shared queue. Capable agents are notified by the scheduler and race to claim it.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "description": {
                        "type": "string",
                        "description": "What needs doing"
                    },
                    "requiredCapabilities": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Capability tags an agent must all carry to work this task. Empty matches every agent."
                    }
                },
                "required": ["description"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("description").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation(
                "Missing required parameter: description".to_string(),
            ));
        }
        capability_set_param(params, "requiredCapabilities")?;
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let description = params["description"].as_str().unwrap();
        let required = capability_set_param(&params, "requiredCapabilities")?;

        let task = ctx.bus.tasks.submit(description, required)?;
        Ok(json!({
            "taskId": task.id,
            "status": task.status,
        }))
    }
}

pub struct ListTasksTool;

#[async_trait]
impl Tool for ListTasksTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "list_tasks",
            description: "List queued tasks, optionally filtered by status and/or by a required capability tag.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "status": {
                        "type": "string",
                        "enum": ["pending", "in-progress", "completed"],
                        "description": "Only tasks in this status"
                    },
                    "capability": {
                        "type": "string",
                        "description": "Only tasks whose requiredCapabilities contains this exact tag"
                    }
                },
                "required": []
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if let Some(status) = params.get("status").and_then(|v| v.as_str()) {
            if TaskStatus::parse(status).is_none() {
                return Err(Error::Validation(format!("Unknown task status: {}", status)));
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let status = params
            .get("status")
            .and_then(|v| v.as_str())
            .and_then(TaskStatus::parse);
        let capability = params.get("capability").and_then(|v| v.as_str());

        let tasks = ctx.bus.tasks.list(status, capability)?;
        Ok(json!({
            "count": tasks.len(),
            "tasks": tasks,
        }))
    }
}

pub struct ClaimTaskTool;

#[async_trait]
impl Tool for ClaimTaskTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "claim_task",
            description: "Take exclusive ownership of a pending task. Under concurrent claims exactly one agent wins; losers get invalid_state and should pick another pending task.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "taskId": {
                        "type": "string",
                        "description": "Task to claim"
                    },
                    "id": {
                        "type": "string",
                        "description": "Claiming agent id"
                    }
                },
                "required": ["taskId", "id"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        for key in ["taskId", "id"] {
            if params.get(key).and_then(|v| v.as_str()).is_none() {
                return Err(Error::Validation(format!("Missing required parameter: {}", key)));
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let task_id = params["taskId"].as_str().unwrap();
        let by = params["id"].as_str().unwrap();

        let task = ctx.bus.tasks.claim(task_id, by)?;
        Ok(json!({
            "status": "claimed",
            "taskId": task.id,
            "assignedTo": task.assigned_to,
        }))
    }
}

pub struct CompleteTaskTool;

#[async_trait]
impl Tool for CompleteTaskTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "complete_task",
            description: "Record a task's result and mark it completed.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "taskId": {
                        "type": "string",
                        "description": "Task to complete"
                    },
                    "result": {
                        "type": "string",
                        "description": "Result payload to store"
                    }
                },
                "required": ["taskId", "result"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        for key in ["taskId", "result"] {
            if params.get(key).and_then(|v| v.as_str()).is_none() {
                return Err(Error::Validation(format!("Missing required parameter: {}", key)));
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let task_id = params["taskId"].as_str().unwrap();
        let result = params["result"].as_str().unwrap();

        let task = ctx.bus.tasks.complete(task_id, result)?;
        Ok(json!({
            "status": "completed",
            "taskId": task.id,
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
    async fn test_submit_claim_complete_flow() {
        let ctx = ctx();
        let submitted = SubmitTaskTool
            .execute(
                ctx.clone(),
                json!({
                    "description": "fetch SOL price",
                    "requiredCapabilities": ["price"]
                }),
            )
            .await
            .unwrap();
        assert_eq!(submitted["status"], "pending");
        let task_id = submitted["taskId"].as_str().unwrap().to_string();

        let claimed = ClaimTaskTool
            .execute(ctx.clone(), json!({"taskId": task_id, "id": "oracle-1"}))
            .await
            .unwrap();
        assert_eq!(claimed["assignedTo"], "oracle-1");

        // losing claimant can tell "taken" from "missing"
        let err = ClaimTaskTool
            .execute(ctx.clone(), json!({"taskId": task_id, "id": "oracle-2"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
        let err = ClaimTaskTool
            .execute(ctx.clone(), json!({"taskId": "task-0-missing", "id": "oracle-2"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        CompleteTaskTool
            .execute(ctx.clone(), json!({"taskId": task_id, "result": "145.32"}))
            .await
            .unwrap();

        let completed = ListTasksTool
            .execute(ctx, json!({"status": "completed"}))
            .await
            .unwrap();
        assert_eq!(completed["count"], 1);
        assert_eq!(completed["tasks"][0]["result"], "145.32");
    }

    #[tokio::test]
    async fn test_list_capability_filter() {
        let ctx = ctx();
        SubmitTaskTool
            .execute(
                ctx.clone(),
                json!({"description": "math", "requiredCapabilities": ["math"]}),
            )
            .await
            .unwrap();
        SubmitTaskTool
            .execute(ctx.clone(), json!({"description": "open"}))
            .await
            .unwrap();

        let math = ListTasksTool
            .execute(ctx.clone(), json!({"capability": "math"}))
            .await
            .unwrap();
        assert_eq!(math["count"], 1);
        assert_eq!(math["tasks"][0]["requiredCapabilities"], json!(["math"]));

        let all = ListTasksTool.execute(ctx, json!({})).await.unwrap();
        assert_eq!(all["count"], 2);
    }

    #[test]
    fn test_list_validate_rejects_bad_status() {
        assert!(ListTasksTool.validate(&json!({"status": "running"})).is_err());
        assert!(ListTasksTool.validate(&json!({"status": "in-progress"})).is_ok());
    }
}
