use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A set of opaque capability tags (e.g. "price", "arbitrage-execution").
///
/// Task matching is a subset test: an agent can work a task iff every
/// capability the task requires is present in the agent's set. Comparison is
/// exact and case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    tags: BTreeSet<String>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_string());
        self
    }

    pub fn insert(&mut self, tag: &str) {
        self.tags.insert(tag.to_string());
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.tags.iter()
    }

    /// Subset test used for capability matching. An empty set is a subset of
    /// everything, so a task with no requirements matches every agent.
    pub fn is_subset_of(&self, other: &CapabilitySet) -> bool {
        self.tags.is_subset(&other.tags)
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            tags: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// A registered agent identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub capabilities: CapabilitySet,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub registered_at: DateTime<Utc>,
}

/// Kind of a mailbox message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Expects exactly one `Response` back to the sender.
    Request,
    /// Reply to an earlier `Request`.
    Response,
    /// Advisory (scheduler task announcements and the like).
    Notification,
    /// Out-of-band data blob, no reply expected.
    Data,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::Notification => "notification",
            MessageKind::Data => "data",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "request" => Some(MessageKind::Request),
            "response" => Some(MessageKind::Response),
            "notification" => Some(MessageKind::Notification),
            "data" => Some(MessageKind::Data),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mailbox message. Append-only; the only mutation ever applied is flipping
/// `read` from false to true.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Monotonic per-store sequence id; per-recipient delivery order follows it.
    #[serde(rename = "sequenceId")]
    pub seq: i64,
    pub from: String,
    pub to: String,
    pub body: String,
    pub kind: MessageKind,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub sent_at: DateTime<Utc>,
    pub read: bool,
}

/// Status of a queued task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Submitted, not yet claimed by anyone.
    Pending,
    /// Claimed by exactly one agent.
    InProgress,
    /// Finished, result recorded.
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in-progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work handed off through the queue.
///
/// Legal transitions: `pending -> in-progress` (claim, exactly one winner)
/// and `in-progress -> completed` (complete). Nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub description: String,
    pub required_capabilities: CapabilitySet,
    pub status: TaskStatus,
    pub assigned_to: Option<String>,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A named shared-context blob with an optional ACL and optional TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEntry {
    pub id: String,
    pub data: serde_json::Value,
    /// Empty means public.
    pub authorized_ids: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    /// None means the entry never expires. Expiry is enforced lazily on read.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ContextEntry {
    pub fn is_public(&self) -> bool {
        self.authorized_ids.is_empty()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }

    pub fn allows(&self, requester_id: &str) -> bool {
        self.is_public() || self.authorized_ids.contains(requester_id)
    }
}
