pub mod context;
pub mod mailbox;
pub mod queue;
pub mod registry;
pub mod store;

pub use context::ContextStore;
pub use mailbox::Mailbox;
pub use queue::TaskQueue;
pub use registry::AgentRegistry;
pub use store::BusStore;

use ailink_core::Result;
use std::path::Path;

/// Handle bundling all bus components over one shared store.
///
/// Constructed once at process start and injected wherever coordination is
/// needed; cloning is cheap and every clone serializes through the same
/// persistence guard.
#[derive(Clone)]
pub struct AgentBus {
    pub registry: AgentRegistry,
    pub mailbox: Mailbox,
    pub tasks: TaskQueue,
    pub contexts: ContextStore,
    store: BusStore,
}

impl AgentBus {
    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self::from_store(BusStore::open(db_path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_store(BusStore::open_in_memory()?))
    }

    fn from_store(store: BusStore) -> Self {
        Self {
            registry: AgentRegistry::new(store.clone()),
            mailbox: Mailbox::new(store.clone()),
            tasks: TaskQueue::new(store.clone()),
            contexts: ContextStore::new(store.clone()),
            store,
        }
    }

    pub fn stats(&self) -> Result<serde_json::Value> {
        self.store.stats()
    }
}
