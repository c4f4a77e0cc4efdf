use ailink_core::{AgentRecord, CapabilitySet, Error, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use crate::store::{db_err, parse_json_col, parse_ts, BusStore};

/// Registry of agent identities and their capability sets.
#[derive(Clone)]
pub struct AgentRegistry {
    store: BusStore,
}

impl AgentRegistry {
    pub fn new(store: BusStore) -> Self {
        Self { store }
    }

    /// Idempotent upsert. A later registration with the same id silently
    /// overwrites the earlier one so agents can re-announce after a restart.
    pub fn register(
        &self,
        id: &str,
        name: &str,
        capabilities: CapabilitySet,
        metadata: serde_json::Value,
    ) -> Result<AgentRecord> {
        let record = AgentRecord {
            id: id.to_string(),
            name: name.to_string(),
            capabilities,
            metadata,
            registered_at: Utc::now(),
        };

        let conn = self.store.guard()?;
        conn.execute(
            "INSERT INTO agents (id, name, capabilities, metadata, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                capabilities = excluded.capabilities,
                metadata = excluded.metadata,
                registered_at = excluded.registered_at",
            params![
                record.id,
                record.name,
                serde_json::to_string(&record.capabilities)?,
                serde_json::to_string(&record.metadata)?,
                record.registered_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        debug!(id = %record.id, name = %record.name, caps = record.capabilities.len(), "Agent registered");
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<AgentRecord> {
        let conn = self.store.guard()?;
        conn.query_row(
            "SELECT id, name, capabilities, metadata, registered_at FROM agents WHERE id = ?1",
            params![id],
            row_to_agent,
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| Error::NotFound(format!("Unknown agent: {}", id)))?
    }

    /// All agents in registration order. With a capability filter, only agents
    /// whose set contains that exact (case-sensitive) tag.
    pub fn list(&self, filter_by_capability: Option<&str>) -> Result<Vec<AgentRecord>> {
        let conn = self.store.guard()?;
        let mut stmt = conn
            .prepare("SELECT id, name, capabilities, metadata, registered_at FROM agents ORDER BY registered_at ASC, id ASC")
            .map_err(db_err)?;
        let rows = stmt.query_map([], row_to_agent).map_err(db_err)?;

        let mut agents = Vec::new();
        for row in rows {
            let agent = row.map_err(db_err)??;
            if let Some(cap) = filter_by_capability {
                if !agent.capabilities.contains(cap) {
                    continue;
                }
            }
            agents.push(agent);
        }
        Ok(agents)
    }
}

fn row_to_agent(row: &Row<'_>) -> rusqlite::Result<Result<AgentRecord>> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let capabilities: String = row.get(2)?;
    let metadata: String = row.get(3)?;
    let registered_at: String = row.get(4)?;

    Ok((|| {
        Ok(AgentRecord {
            id,
            name,
            capabilities: parse_json_col(&capabilities)?,
            metadata: parse_json_col(&metadata)?,
            registered_at: parse_ts(&registered_at)?,
        })
    })())
}
