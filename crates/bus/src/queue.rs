use ailink_core::{CapabilitySet, Error, Result, Task, TaskStatus};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::store::{db_err, parse_json_col, parse_ts, BusStore};

/// Work queue with capability-based matching and an exclusive-claim state
/// machine: `pending -> in-progress -> completed`.
#[derive(Clone)]
pub struct TaskQueue {
    store: BusStore,
}

impl TaskQueue {
    pub fn new(store: BusStore) -> Self {
        Self { store }
    }

    /// Insert a new pending task under a freshly generated id.
    pub fn submit(&self, description: &str, required_capabilities: CapabilitySet) -> Result<Task> {
        let task = Task {
            id: generate_task_id(),
            description: description.to_string(),
            required_capabilities,
            status: TaskStatus::Pending,
            assigned_to: None,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        let conn = self.store.guard()?;
        conn.execute(
            "INSERT INTO tasks (id, description, required_capabilities, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                task.id,
                task.description,
                serde_json::to_string(&task.required_capabilities)?,
                task.status.as_str(),
                task.created_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        debug!(task_id = %task.id, caps = task.required_capabilities.len(), "Task submitted");
        Ok(task)
    }

    pub fn get(&self, task_id: &str) -> Result<Task> {
        let conn = self.store.guard()?;
        conn.query_row(
            "SELECT id, description, required_capabilities, status, assigned_to, result,
                    created_at, started_at, completed_at
             FROM tasks WHERE id = ?1",
            params![task_id],
            row_to_task,
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| Error::NotFound(format!("Unknown task: {}", task_id)))?
    }

    /// Tasks in submission order, optionally filtered by status equality and by
    /// a capability that must be contained in `required_capabilities`.
    pub fn list(&self, status: Option<TaskStatus>, capability: Option<&str>) -> Result<Vec<Task>> {
        let conn = self.store.guard()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, description, required_capabilities, status, assigned_to, result,
                        created_at, started_at, completed_at
                 FROM tasks ORDER BY created_at ASC, id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt.query_map([], row_to_task).map_err(db_err)?;

        let mut tasks = Vec::new();
        for row in rows {
            let task = row.map_err(db_err)??;
            if let Some(want) = status {
                if task.status != want {
                    continue;
                }
            }
            if let Some(cap) = capability {
                if !task.required_capabilities.contains(cap) {
                    continue;
                }
            }
            tasks.push(task);
        }
        Ok(tasks)
    }

    /// Take exclusive ownership of a pending task.
    ///
    /// The transition is a single conditional UPDATE under the guard, so under
    /// concurrent claims exactly one caller wins; losers see
    /// `InvalidState("not pending")` and unknown ids see `NotFound` so they can
    /// tell "already taken" from "doesn't exist".
    pub fn claim(&self, task_id: &str, by: &str) -> Result<Task> {
        let conn = self.store.guard()?;

        let updated = conn
            .execute(
                "UPDATE tasks SET status = ?1, assigned_to = ?2, started_at = ?3
                 WHERE id = ?4 AND status = ?5",
                params![
                    TaskStatus::InProgress.as_str(),
                    by,
                    Utc::now().to_rfc3339(),
                    task_id,
                    TaskStatus::Pending.as_str(),
                ],
            )
            .map_err(db_err)?;

        if updated == 0 {
            let exists: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM tasks WHERE id = ?1",
                    params![task_id],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            return if exists == 0 {
                Err(Error::NotFound(format!("Unknown task: {}", task_id)))
            } else {
                Err(Error::InvalidState("not pending".to_string()))
            };
        }
        drop(conn);

        debug!(task_id, by, "Task claimed");
        self.get(task_id)
    }

    /// Record the result and mark the task completed.
    ///
    /// Completing a task that is already completed is accepted and overwrites
    /// the stored result (some submitters retry completion); the clobber is
    /// logged so operators can spot it.
    pub fn complete(&self, task_id: &str, result: &str) -> Result<Task> {
        let conn = self.store.guard()?;

        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM tasks WHERE id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let current =
            current.ok_or_else(|| Error::NotFound(format!("Unknown task: {}", task_id)))?;

        if current == TaskStatus::Completed.as_str() {
            warn!(task_id, "Completing an already-completed task, result overwritten");
        }

        conn.execute(
            "UPDATE tasks SET status = ?1, result = ?2, completed_at = ?3 WHERE id = ?4",
            params![
                TaskStatus::Completed.as_str(),
                result,
                Utc::now().to_rfc3339(),
                task_id,
            ],
        )
        .map_err(db_err)?;
        drop(conn);

        debug!(task_id, "Task completed");
        self.get(task_id)
    }
}

/// Unix-millis timestamp plus a short random suffix; unique across processes.
fn generate_task_id() -> String {
    let suffix: String = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
    format!("task-{}-{}", Utc::now().timestamp_millis(), suffix)
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Result<Task>> {
    let id: String = row.get(0)?;
    let description: String = row.get(1)?;
    let required: String = row.get(2)?;
    let status: String = row.get(3)?;
    let assigned_to: Option<String> = row.get(4)?;
    let result: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;
    let started_at: Option<String> = row.get(7)?;
    let completed_at: Option<String> = row.get(8)?;

    Ok((|| {
        Ok(Task {
            id,
            description,
            required_capabilities: parse_json_col(&required)?,
            status: TaskStatus::parse(&status)
                .ok_or_else(|| Error::Storage(format!("Bad task status '{}'", status)))?,
            assigned_to,
            result,
            created_at: parse_ts(&created_at)?,
            started_at: started_at.as_deref().map(parse_ts).transpose()?,
            completed_at: completed_at.as_deref().map(parse_ts).transpose()?,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> TaskQueue {
        TaskQueue::new(BusStore::open_in_memory().unwrap())
    }

    fn caps(tags: &[&str]) -> CapabilitySet {
        tags.iter().copied().collect()
    }

    #[test]
    fn test_submit_is_pending_with_unique_id() {
        let q = queue();
        let a = q.submit("fetch SOL price", caps(&["price"])).unwrap();
        let b = q.submit("fetch SOL price", caps(&["price"])).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, TaskStatus::Pending);
        assert!(a.id.starts_with("task-"));
        assert!(a.assigned_to.is_none());
    }

    #[test]
    fn test_claim_transitions_to_in_progress() {
        let q = queue();
        let task = q.submit("work", caps(&[])).unwrap();
        let claimed = q.claim(&task.id, "oracle-1").unwrap();
        assert_eq!(claimed.status, TaskStatus::InProgress);
        assert_eq!(claimed.assigned_to.as_deref(), Some("oracle-1"));
        assert!(claimed.started_at.is_some());
    }

    #[test]
    fn test_second_claim_is_invalid_state() {
        let q = queue();
        let task = q.submit("work", caps(&[])).unwrap();
        q.claim(&task.id, "oracle-1").unwrap();
        let err = q.claim(&task.id, "oracle-2").unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
        // ownership unchanged
        assert_eq!(q.get(&task.id).unwrap().assigned_to.as_deref(), Some("oracle-1"));
    }

    #[test]
    fn test_claim_unknown_task_is_not_found() {
        let err = queue().claim("task-0-deadbeef", "a1").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let store = BusStore::open_in_memory().unwrap();
        let q = TaskQueue::new(store);
        let task = q.submit("contended", caps(&[])).unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let q = q.clone();
            let id = task.id.clone();
            handles.push(std::thread::spawn(move || q.claim(&id, &format!("agent-{}", i))));
        }

        let mut wins = 0;
        let mut losses = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => wins += 1,
                Err(e) => {
                    assert_eq!(e.kind(), "invalid_state");
                    losses += 1;
                }
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(losses, 7);
    }

    #[test]
    fn test_complete_records_result() {
        let q = queue();
        let task = q.submit("price check", caps(&["price"])).unwrap();
        q.claim(&task.id, "oracle-1").unwrap();
        let done = q.complete(&task.id, "145.32").unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result.as_deref(), Some("145.32"));
        assert!(done.completed_at.is_some());

        let completed = q.list(Some(TaskStatus::Completed), None).unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].result.as_deref(), Some("145.32"));
    }

    #[test]
    fn test_complete_unknown_task_is_not_found() {
        let err = queue().complete("task-0-deadbeef", "x").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_repeat_complete_overwrites_result() {
        let q = queue();
        let task = q.submit("work", caps(&[])).unwrap();
        q.claim(&task.id, "a1").unwrap();
        q.complete(&task.id, "first").unwrap();
        let again = q.complete(&task.id, "second").unwrap();
        assert_eq!(again.result.as_deref(), Some("second"));
    }

    #[test]
    fn test_list_filters() {
        let q = queue();
        let t1 = q.submit("math work", caps(&["math"])).unwrap();
        q.submit("chess work", caps(&["chess"])).unwrap();
        q.submit("open work", caps(&[])).unwrap();

        // capability filter is strict membership, not "doesn't conflict"
        let math = q.list(None, Some("math")).unwrap();
        assert_eq!(math.len(), 1);
        assert_eq!(math[0].id, t1.id);

        q.claim(&t1.id, "a1").unwrap();
        assert_eq!(q.list(Some(TaskStatus::Pending), None).unwrap().len(), 2);
        assert_eq!(q.list(Some(TaskStatus::InProgress), None).unwrap().len(), 1);
        assert_eq!(q.list(None, None).unwrap().len(), 3);
    }
}
