use ailink_core::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// The shared store behind every bus component.
///
/// The `Mutex<Connection>` is the serialization point for all read-modify-write
/// access: a component takes the guard once, performs its reads and writes, and
/// releases it before returning. No caller holds the guard across I/O that is
/// not the store's own.
#[derive(Clone)]
pub struct BusStore {
    inner: Arc<Mutex<Connection>>,
}

impl BusStore {
    /// Open (or create) the bus database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| Error::Storage(format!("Failed to open bus db: {}", e)))?;

        // WAL keeps concurrent readers cheap
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        let store = Self {
            inner: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a throwaway in-memory store (tests, one-shot CLI calls).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to open in-memory db: {}", e)))?;
        let store = Self {
            inner: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Acquire the persistence guard. Every read-modify-write in the bus runs
    /// inside exactly one of these acquisitions.
    pub(crate) fn guard(&self) -> Result<MutexGuard<'_, Connection>> {
        self.inner
            .lock()
            .map_err(|e| Error::Storage(format!("Lock poisoned: {}", e)))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.guard()?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                capabilities TEXT NOT NULL DEFAULT '[]',
                metadata TEXT NOT NULL DEFAULT 'null',
                registered_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                from_id TEXT NOT NULL,
                to_id TEXT NOT NULL,
                body TEXT NOT NULL,
                kind TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT 'null',
                sent_at TEXT NOT NULL,
                read INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_messages_to ON messages(to_id);
            CREATE INDEX IF NOT EXISTS idx_messages_to_unread ON messages(to_id, read);

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                required_capabilities TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'pending',
                assigned_to TEXT,
                result TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);

            CREATE TABLE IF NOT EXISTS contexts (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                authorized_ids TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                expires_at TEXT
            );
            ",
        )
        .map_err(|e| Error::Storage(format!("Failed to init bus schema: {}", e)))?;

        debug!("Bus store schema initialized");
        Ok(())
    }

    /// Row counts per table, for `status` output and observability logs.
    pub fn stats(&self) -> Result<serde_json::Value> {
        let conn = self.guard()?;
        let count = |sql: &str| -> Result<i64> {
            conn.query_row(sql, [], |row| row.get(0))
                .map_err(|e| Error::Storage(format!("Stats query failed: {}", e)))
        };
        Ok(json!({
            "agents": count("SELECT COUNT(*) FROM agents")?,
            "messages": count("SELECT COUNT(*) FROM messages")?,
            "unreadMessages": count("SELECT COUNT(*) FROM messages WHERE read = 0")?,
            "tasks": {
                "pending": count("SELECT COUNT(*) FROM tasks WHERE status = 'pending'")?,
                "inProgress": count("SELECT COUNT(*) FROM tasks WHERE status = 'in-progress'")?,
                "completed": count("SELECT COUNT(*) FROM tasks WHERE status = 'completed'")?,
            },
            "contexts": count("SELECT COUNT(*) FROM contexts")?,
        }))
    }
}

/// Parse an RFC 3339 timestamp column.
pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("Bad timestamp '{}': {}", s, e)))
}

/// Parse a JSON column.
pub(crate) fn parse_json_col<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_str(s).map_err(|e| Error::Storage(format!("Bad JSON column: {}", e)))
}

/// Map any rusqlite error into our storage error.
pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    Error::Storage(format!("Query error: {}", e))
}
