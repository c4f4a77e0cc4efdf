use ailink_core::{ContextEntry, Error, Result};
use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::store::{db_err, parse_json_col, parse_ts, BusStore};

/// Named shared-data blobs with an optional ACL and optional TTL.
///
/// Expiry is lazy: an expired entry stays in storage and reads as `Expired`
/// until it is re-shared or physically removed by [`ContextStore::sweep_expired`].
#[derive(Clone)]
pub struct ContextStore {
    store: BusStore,
}

impl ContextStore {
    pub fn new(store: BusStore) -> Self {
        Self { store }
    }

    /// Upsert a context entry. An empty `authorized_ids` set means public.
    pub fn share(
        &self,
        id: &str,
        data: serde_json::Value,
        authorized_ids: BTreeSet<String>,
        ttl_seconds: Option<i64>,
    ) -> Result<ContextEntry> {
        let created_at = Utc::now();
        let entry = ContextEntry {
            id: id.to_string(),
            data,
            authorized_ids,
            created_at,
            expires_at: ttl_seconds.map(|ttl| created_at + Duration::seconds(ttl)),
        };

        let conn = self.store.guard()?;
        conn.execute(
            "INSERT INTO contexts (id, data, authorized_ids, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                authorized_ids = excluded.authorized_ids,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at",
            params![
                entry.id,
                serde_json::to_string(&entry.data)?,
                serde_json::to_string(&entry.authorized_ids)?,
                entry.created_at.to_rfc3339(),
                entry.expires_at.map(|at| at.to_rfc3339()),
            ],
        )
        .map_err(db_err)?;

        debug!(
            id = %entry.id,
            public = entry.is_public(),
            ttl_seconds = ttl_seconds.unwrap_or(-1),
            "Context shared"
        );
        Ok(entry)
    }

    /// Read a context entry's data, gated by ACL first and expiry second.
    pub fn get(&self, id: &str, requester_id: &str) -> Result<serde_json::Value> {
        let conn = self.store.guard()?;
        let entry = conn
            .query_row(
                "SELECT id, data, authorized_ids, created_at, expires_at
                 FROM contexts WHERE id = ?1",
                params![id],
                row_to_entry,
            )
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| Error::NotFound(format!("Unknown context: {}", id)))??;

        if !entry.allows(requester_id) {
            return Err(Error::Unauthorized(format!(
                "Agent {} is not authorized for context {}",
                requester_id, id
            )));
        }
        if entry.is_expired(Utc::now()) {
            return Err(Error::Expired(format!("Context {} has expired", id)));
        }
        Ok(entry.data)
    }

    /// Physically delete expired entries. Does not change read semantics; it
    /// only reclaims storage for entries that were already unreadable.
    pub fn sweep_expired(&self) -> Result<usize> {
        let conn = self.store.guard()?;
        let removed = conn
            .execute(
                "DELETE FROM contexts WHERE expires_at IS NOT NULL AND expires_at < ?1",
                params![Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;
        if removed > 0 {
            info!(removed, "Swept expired contexts");
        }
        Ok(removed)
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<Result<ContextEntry>> {
    let id: String = row.get(0)?;
    let data: String = row.get(1)?;
    let authorized_ids: String = row.get(2)?;
    let created_at: String = row.get(3)?;
    let expires_at: Option<String> = row.get(4)?;

    Ok((|| {
        Ok(ContextEntry {
            id,
            data: parse_json_col(&data)?,
            authorized_ids: parse_json_col(&authorized_ids)?,
            created_at: parse_ts(&created_at)?,
            expires_at: expires_at.as_deref().map(parse_ts).transpose()?,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contexts() -> ContextStore {
        ContextStore::new(BusStore::open_in_memory().unwrap())
    }

    fn acl(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_public_context_readable_by_anyone() {
        let store = contexts();
        store.share("prices", json!({"SOL": 145.32}), acl(&[]), None).unwrap();
        assert_eq!(store.get("prices", "whoever").unwrap()["SOL"], 145.32);
    }

    #[test]
    fn test_acl_enforced() {
        let store = contexts();
        store
            .share("hw-state", json!({"armed": true}), acl(&["a1"]), None)
            .unwrap();
        assert!(store.get("hw-state", "a1").is_ok());
        let err = store.get("hw-state", "a2").unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
    }

    #[test]
    fn test_unknown_context_is_not_found() {
        let err = contexts().get("missing", "a1").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_expired_entry_stays_in_storage() {
        let store = contexts();
        // ttl in the past: readable never, but the row survives
        store.share("stale", json!(1), acl(&[]), Some(-1)).unwrap();
        let err = store.get("stale", "a1").unwrap_err();
        assert_eq!(err.kind(), "expired");
        // still expired on a second read (lazy, not deleted)
        assert_eq!(store.get("stale", "a1").unwrap_err().kind(), "expired");

        // re-share revives it
        store.share("stale", json!(2), acl(&[]), Some(3600)).unwrap();
        assert_eq!(store.get("stale", "a1").unwrap(), json!(2));
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let store = contexts();
        store.share("forever", json!("ok"), acl(&[]), None).unwrap();
        assert!(store.get("forever", "a1").is_ok());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let store = contexts();
        store.share("stale", json!(1), acl(&[]), Some(-1)).unwrap();
        store.share("fresh", json!(2), acl(&[]), Some(3600)).unwrap();
        store.share("forever", json!(3), acl(&[]), None).unwrap();

        assert_eq!(store.sweep_expired().unwrap(), 1);
        assert_eq!(store.get("stale", "a1").unwrap_err().kind(), "not_found");
        assert!(store.get("fresh", "a1").is_ok());
        assert!(store.get("forever", "a1").is_ok());
        assert_eq!(store.sweep_expired().unwrap(), 0);
    }
}
