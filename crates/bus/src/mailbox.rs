use ailink_core::{Error, Message, MessageKind, Result};
use chrono::Utc;
use rusqlite::{params, Row};
use tracing::debug;

use crate::store::{db_err, parse_json_col, parse_ts, BusStore};

/// Per-recipient ordered message log.
///
/// Messages are append-only; the only lifecycle state is the read flag.
/// Delivery order per recipient follows the store-wide sequence id, which the
/// AUTOINCREMENT column keeps monotonic.
#[derive(Clone)]
pub struct Mailbox {
    store: BusStore,
}

impl Mailbox {
    pub fn new(store: BusStore) -> Self {
        Self { store }
    }

    /// Append a new unread message. Fails with `NotFound` when the recipient is
    /// not a registered agent, so a sender can detect and re-register or retry
    /// instead of the message vanishing.
    pub fn send(
        &self,
        from: &str,
        to: &str,
        body: &str,
        kind: MessageKind,
        metadata: serde_json::Value,
    ) -> Result<Message> {
        let conn = self.store.guard()?;

        let recipient_exists: i64 = conn
            .query_row("SELECT COUNT(*) FROM agents WHERE id = ?1", params![to], |row| {
                row.get(0)
            })
            .map_err(db_err)?;
        if recipient_exists == 0 {
            return Err(Error::NotFound(format!("Unknown recipient: {}", to)));
        }

        let sent_at = Utc::now();
        conn.execute(
            "INSERT INTO messages (from_id, to_id, body, kind, metadata, sent_at, read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                from,
                to,
                body,
                kind.as_str(),
                serde_json::to_string(&metadata)?,
                sent_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        let seq = conn.last_insert_rowid();

        debug!(seq, from, to, kind = %kind, "Message sent");
        Ok(Message {
            seq,
            from: from.to_string(),
            to: to.to_string(),
            body: body.to_string(),
            kind,
            metadata,
            sent_at,
            read: false,
        })
    }

    /// Fetch messages addressed to `for_id` in send order.
    ///
    /// With `mark_as_read`, every returned message is flipped to read before
    /// this call returns, under the same guard acquisition as the select. The
    /// caller sees exactly the snapshot it marked, never a partial or later
    /// set.
    pub fn read(&self, for_id: &str, unread_only: bool, mark_as_read: bool) -> Result<Vec<Message>> {
        let conn = self.store.guard()?;

        let sql = if unread_only {
            "SELECT seq, from_id, to_id, body, kind, metadata, sent_at, read
             FROM messages WHERE to_id = ?1 AND read = 0 ORDER BY seq ASC"
        } else {
            "SELECT seq, from_id, to_id, body, kind, metadata, sent_at, read
             FROM messages WHERE to_id = ?1 ORDER BY seq ASC"
        };

        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt.query_map(params![for_id], row_to_message).map_err(db_err)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row.map_err(db_err)??);
        }
        drop(stmt);

        if mark_as_read && !messages.is_empty() {
            let mut update = conn
                .prepare("UPDATE messages SET read = 1 WHERE seq = ?1")
                .map_err(db_err)?;
            for msg in &messages {
                update.execute(params![msg.seq]).map_err(db_err)?;
            }
            debug!(for_id, count = messages.len(), "Messages marked read");
        }

        Ok(messages)
    }

    /// Unread count without touching the read flags.
    pub fn unread_count(&self, for_id: &str) -> Result<i64> {
        let conn = self.store.guard()?;
        conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE to_id = ?1 AND read = 0",
            params![for_id],
            |row| row.get(0),
        )
        .map_err(db_err)
    }
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Result<Message>> {
    let seq: i64 = row.get(0)?;
    let from: String = row.get(1)?;
    let to: String = row.get(2)?;
    let body: String = row.get(3)?;
    let kind: String = row.get(4)?;
    let metadata: String = row.get(5)?;
    let sent_at: String = row.get(6)?;
    let read: i64 = row.get(7)?;

    Ok((|| {
        Ok(Message {
            seq,
            from,
            to,
            body,
            kind: MessageKind::parse(&kind)
                .ok_or_else(|| Error::Storage(format!("Bad message kind '{}'", kind)))?,
            metadata: parse_json_col(&metadata)?,
            sent_at: parse_ts(&sent_at)?,
            read: read != 0,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AgentRegistry;
    use ailink_core::CapabilitySet;
    use serde_json::json;

    fn bus() -> (AgentRegistry, Mailbox) {
        let store = BusStore::open_in_memory().unwrap();
        let registry = AgentRegistry::new(store.clone());
        registry
            .register("a1", "Agent One", CapabilitySet::new(), json!(null))
            .unwrap();
        registry
            .register("a2", "Agent Two", CapabilitySet::new(), json!(null))
            .unwrap();
        (registry, Mailbox::new(store))
    }

    #[test]
    fn test_send_to_unknown_recipient_stores_nothing() {
        let (_, mailbox) = bus();
        let err = mailbox
            .send("user", "nonexistent", "hello", MessageKind::Request, json!(null))
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
        // nothing must have been appended anywhere
        assert!(mailbox.read("nonexistent", false, false).unwrap().is_empty());
    }

    #[test]
    fn test_fifo_order_per_recipient() {
        let (_, mailbox) = bus();
        for i in 0..5 {
            mailbox
                .send("a1", "a2", &format!("msg-{}", i), MessageKind::Data, json!(null))
                .unwrap();
        }
        let msgs = mailbox.read("a2", false, false).unwrap();
        let bodies: Vec<_> = msgs.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["msg-0", "msg-1", "msg-2", "msg-3", "msg-4"]);
        assert!(msgs.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[test]
    fn test_unread_exactly_once_with_mark() {
        let (_, mailbox) = bus();
        mailbox
            .send("a1", "a2", "ping", MessageKind::Request, json!(null))
            .unwrap();

        let first = mailbox.read("a2", true, true).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].body, "ping");
        // snapshot reflects pre-mutation content
        assert!(!first[0].read);

        // gone from subsequent unread reads, still present in full reads
        assert!(mailbox.read("a2", true, true).unwrap().is_empty());
        let all = mailbox.read("a2", false, false).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].read);
    }

    #[test]
    fn test_read_without_mark_leaves_unread() {
        let (_, mailbox) = bus();
        mailbox
            .send("a1", "a2", "ping", MessageKind::Notification, json!(null))
            .unwrap();
        assert_eq!(mailbox.read("a2", true, false).unwrap().len(), 1);
        assert_eq!(mailbox.read("a2", true, false).unwrap().len(), 1);
        assert_eq!(mailbox.unread_count("a2").unwrap(), 1);
    }

    #[test]
    fn test_metadata_round_trip() {
        let (_, mailbox) = bus();
        let meta = json!({"taskId": "task-1", "nested": {"n": 2}});
        mailbox
            .send("a1", "a2", "see metadata", MessageKind::Data, meta.clone())
            .unwrap();
        let msgs = mailbox.read("a2", true, true).unwrap();
        assert_eq!(msgs[0].metadata, meta);
    }

    #[test]
    fn test_mailboxes_are_isolated() {
        let (_, mailbox) = bus();
        mailbox
            .send("a1", "a2", "for a2", MessageKind::Data, json!(null))
            .unwrap();
        assert!(mailbox.read("a1", true, false).unwrap().is_empty());
    }
}
