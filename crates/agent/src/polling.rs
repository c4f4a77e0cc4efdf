use ailink_bus::AgentBus;
use ailink_core::{CapabilitySet, Message, MessageKind, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Domain logic invoked for every `request` message an agent receives.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, body: &str, metadata: &Value) -> Result<String>;
}

/// Invoked for every `notification` message (scheduler task announcements).
/// Workers typically claim the announced task from here.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn on_notification(&self, message: &Message);
}

/// The agent side of the bus: register once, then poll the mailbox on a fixed
/// interval and answer requests.
///
/// Every drained `request` produces exactly one `response` back to its sender,
/// an error string if the handler failed. A request is only ever abandoned if
/// the process dies between marking it read and sending the response.
pub struct PollingClient {
    bus: AgentBus,
    id: String,
    name: String,
    capabilities: CapabilitySet,
    metadata: Value,
    poll_interval: Duration,
    handler: Arc<dyn RequestHandler>,
    on_notification: Option<Arc<dyn NotificationHandler>>,
}

impl PollingClient {
    pub fn new(
        bus: AgentBus,
        id: &str,
        name: &str,
        capabilities: CapabilitySet,
        handler: Arc<dyn RequestHandler>,
    ) -> Self {
        Self {
            bus,
            id: id.to_string(),
            name: name.to_string(),
            capabilities,
            metadata: Value::Null,
            poll_interval: Duration::from_secs(2),
            handler,
            on_notification: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_notification_handler(mut self, handler: Arc<dyn NotificationHandler>) -> Self {
        self.on_notification = Some(handler);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Announce this agent to the registry. Safe to repeat after a restart
    /// since registration is an upsert.
    pub fn register(&self) -> Result<()> {
        self.bus.registry.register(
            &self.id,
            &self.name,
            self.capabilities.clone(),
            self.metadata.clone(),
        )?;
        info!(id = %self.id, "Agent registered on bus");
        Ok(())
    }

    /// Drain unread mail once. Returns the number of messages processed.
    pub async fn poll_once(&self) -> Result<usize> {
        let messages = self.bus.mailbox.read(&self.id, true, true)?;
        let count = messages.len();

        for message in messages {
            match message.kind {
                MessageKind::Request => self.answer_request(&message).await,
                MessageKind::Notification => {
                    if let Some(hook) = &self.on_notification {
                        hook.on_notification(&message).await;
                    } else {
                        debug!(id = %self.id, seq = message.seq, "Notification ignored (no handler)");
                    }
                }
                MessageKind::Response | MessageKind::Data => {
                    debug!(id = %self.id, seq = message.seq, kind = %message.kind, "Message drained");
                }
            }
        }
        Ok(count)
    }

    /// Run the handler and mail exactly one response back, error string
    /// included. A failed handler never silently drops the request.
    async fn answer_request(&self, request: &Message) {
        let (body, failed) = match self.handler.handle(&request.body, &request.metadata).await {
            Ok(result) => (result, false),
            Err(e) => {
                warn!(id = %self.id, seq = request.seq, error = %e, "Request handler failed");
                (format!("Error: {}", e), true)
            }
        };

        let metadata = json!({ "inReplyTo": request.seq, "error": failed });
        if let Err(e) = self.bus.mailbox.send(
            &self.id,
            &request.from,
            &body,
            MessageKind::Response,
            metadata,
        ) {
            // sender deregistered or store failure; nothing more we can do
            error!(id = %self.id, to = %request.from, error = %e, "Failed to send response");
        }
    }

    /// Register, then poll until shutdown. Poll failures are logged and the
    /// loop continues; an in-flight poll finishes before the loop exits.
    pub async fn run_loop(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        if let Err(e) = self.register() {
            error!(id = %self.id, error = %e, "Registration failed, agent not starting");
            return;
        }
        info!(id = %self.id, interval_ms = self.poll_interval.as_millis() as u64, "PollingClient started");

        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.poll_once().await {
                        Ok(0) => {}
                        Ok(count) => debug!(id = %self.id, count, "Processed messages"),
                        Err(e) => error!(id = %self.id, error = %e, "Poll failed"),
                    }
                }
                _ = shutdown.recv() => {
                    info!(id = %self.id, "PollingClient shutting down");
                    break;
                }
            }
        }
    }
}
