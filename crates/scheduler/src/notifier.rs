use ailink_bus::AgentBus;
use ailink_core::{MessageKind, Result, Task, TaskStatus};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info};

/// Sender id stamped on every notification message.
pub const SCHEDULER_ID: &str = "scheduler";

/// Background loop that announces pending tasks to capable agents.
///
/// Assignment is advisory only: the notifier never touches task status, it
/// just drops a `notification` message into the first capable agent's mailbox.
/// The agent still has to `claim` the task, so an agent that dies between
/// notification and claim costs nothing: the task stays pending and claimable
/// by anyone.
///
/// The de-duplication set is process-lifetime only. After a restart,
/// still-pending tasks may be announced a second time; that is harmless
/// because claim stays exclusive.
pub struct TaskNotifier {
    bus: AgentBus,
    interval: Duration,
    notified: Mutex<HashSet<String>>,
}

impl TaskNotifier {
    pub fn new(bus: AgentBus) -> Self {
        Self {
            bus,
            interval: Duration::from_secs(1),
            notified: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One pass over the pending queue. Returns how many notifications were
    /// sent. A failure on one task is logged and does not stop the others.
    pub fn run_tick(&self) -> Result<usize> {
        let pending = self.bus.tasks.list(Some(TaskStatus::Pending), None)?;
        if pending.is_empty() {
            return Ok(0);
        }
        let agents = self.bus.registry.list(None)?;

        let mut sent = 0;
        for task in &pending {
            {
                let notified = self
                    .notified
                    .lock()
                    .map_err(|e| ailink_core::Error::Other(format!("Lock poisoned: {}", e)))?;
                if notified.contains(&task.id) {
                    continue;
                }
            }

            // first capable agent in listing order, deterministically
            let Some(agent) = agents
                .iter()
                .find(|a| task.required_capabilities.is_subset_of(&a.capabilities))
            else {
                debug!(task_id = %task.id, "No capable agent yet, will retry");
                continue;
            };

            match self.notify(task, &agent.id) {
                Ok(()) => {
                    self.notified
                        .lock()
                        .map_err(|e| ailink_core::Error::Other(format!("Lock poisoned: {}", e)))?
                        .insert(task.id.clone());
                    sent += 1;
                }
                Err(e) => {
                    error!(task_id = %task.id, agent = %agent.id, error = %e, "Failed to notify agent");
                }
            }
        }
        Ok(sent)
    }

    fn notify(&self, task: &Task, agent_id: &str) -> Result<()> {
        let body = format!("Task available: {} ({})", task.id, task.description);
        let metadata = json!({
            "taskId": task.id,
            "requiredCapabilities": task.required_capabilities,
        });
        self.bus
            .mailbox
            .send(SCHEDULER_ID, agent_id, &body, MessageKind::Notification, metadata)?;
        info!(task_id = %task.id, agent = agent_id, "Task announced");
        Ok(())
    }

    /// Fixed-interval loop with explicit shutdown. A tick that fails is logged
    /// and the loop continues on the next tick.
    pub async fn run_loop(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(interval_ms = self.interval.as_millis() as u64, "TaskNotifier started");

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_tick() {
                        error!(error = %e, "Notifier tick failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("TaskNotifier shutting down");
                    break;
                }
            }
        }
    }
}
