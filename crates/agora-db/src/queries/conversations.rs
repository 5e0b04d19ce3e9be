use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{Connection, params};

use super::{OptionalExt, placeholders};
use crate::Database;
use crate::models::{ConversationRow, DirectMessageRow};

pub enum LeaveOutcome {
    NotParticipant,
    Left,
    /// The caller was the last participant; the conversation is gone.
    Deleted,
}

pub enum DeleteOutcome {
    NotFound,
    Deleted { conversation_id: String },
}

/// Sorted, comma-joined participant ids. Used to find an existing
/// two-person conversation.
fn participant_key(participants: &[String]) -> String {
    let mut ids: Vec<&str> = participants.iter().map(String::as_str).collect();
    ids.sort_unstable();
    ids.join(",")
}

impl Database {
    // -- Conversations --

    /// Returns the existing two-person conversation for this participant set,
    /// or creates a new one. The bool is `true` when a conversation was created.
    pub fn find_or_create_conversation(
        &self,
        id: &str,
        participants: &[String],
        viewer: &str,
        now: i64,
    ) -> Result<(ConversationRow, bool)> {
        let key = participant_key(participants);

        self.with_conn_mut(|conn| {
            if participants.len() == 2 {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT c.id FROM conversations c
                         WHERE c.participant_key = ?1
                           AND (SELECT COUNT(*) FROM conversation_participants p
                                WHERE p.conversation_id = c.id) = 2
                         LIMIT 1",
                        [&key],
                        |row| row.get(0),
                    )
                    .optional()?;

                if let Some(existing_id) = existing {
                    let row = load_conversation(conn, &existing_id, viewer)?
                        .ok_or_else(|| anyhow::anyhow!("Conversation vanished: {}", existing_id))?;
                    return Ok((row, false));
                }
            }

            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO conversations (id, participant_key, last_activity, created_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![id, key, now],
            )?;
            for user_id in participants {
                tx.execute(
                    "INSERT INTO conversation_participants (conversation_id, user_id, joined_at)
                     VALUES (?1, ?2, ?3)",
                    params![id, user_id, now],
                )?;
            }
            tx.commit()?;

            let row = load_conversation(conn, id, viewer)?
                .ok_or_else(|| anyhow::anyhow!("Conversation not persisted: {}", id))?;
            Ok((row, true))
        })
    }

    pub fn get_conversation(&self, id: &str, viewer: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| load_conversation(conn, id, viewer))
    }

    /// Conversations the user takes part in, most recently active first.
    pub fn list_conversations(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id FROM conversations c
                 JOIN conversation_participants p ON p.conversation_id = c.id
                 WHERE p.user_id = ?1
                 ORDER BY c.last_activity DESC, c.rowid DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let ids = stmt
                .query_map(params![user_id, limit, offset], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut rows = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(row) = load_conversation(conn, &id, user_id)? {
                    rows.push(row);
                }
            }
            Ok(rows)
        })
    }

    pub fn leave_conversation(&self, id: &str, user_id: &str) -> Result<LeaveOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let removed = tx.execute(
                "DELETE FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            if removed == 0 {
                return Ok(LeaveOutcome::NotParticipant);
            }

            let remaining = participants(&tx, id)?;
            let outcome = if remaining.is_empty() {
                tx.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
                LeaveOutcome::Deleted
            } else {
                tx.execute(
                    "UPDATE conversations SET participant_key = ?2 WHERE id = ?1",
                    params![id, participant_key(&remaining)],
                )?;
                LeaveOutcome::Left
            };
            tx.commit()?;
            Ok(outcome)
        })
    }

    /// Total unread direct messages across every conversation of the user.
    pub fn unread_total(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM direct_messages m
                 JOIN conversation_participants p
                   ON p.conversation_id = m.conversation_id AND p.user_id = ?1
                 WHERE m.sender_id != ?1 AND m.is_deleted = 0
                   AND NOT EXISTS (SELECT 1 FROM message_reads r
                                   WHERE r.message_id = m.id AND r.user_id = ?1)",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    // -- Direct messages --

    /// Stores a message, marks it read by its sender and makes it the
    /// conversation's last message.
    pub fn insert_direct_message(
        &self,
        id: &str,
        conversation_id: &str,
        sender_id: &str,
        sender_username: &str,
        content: &str,
        now: i64,
    ) -> Result<DirectMessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO direct_messages (id, conversation_id, sender_id, sender_username, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, conversation_id, sender_id, sender_username, content, now],
            )?;
            tx.execute(
                "INSERT INTO message_reads (message_id, user_id, read_at) VALUES (?1, ?2, ?3)",
                params![id, sender_id, now],
            )?;
            tx.execute(
                "UPDATE conversations SET last_message_id = ?2, last_activity = ?3 WHERE id = ?1",
                params![conversation_id, id, now],
            )?;
            tx.commit()?;

            load_message(conn, id)?.ok_or_else(|| anyhow::anyhow!("Message not persisted: {}", id))
        })
    }

    /// Non-deleted messages, newest first. `before` is an exclusive
    /// millisecond cursor.
    pub fn get_direct_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<DirectMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, sender_username, content, is_deleted, edited_at, created_at
                 FROM direct_messages
                 WHERE conversation_id = ?1 AND is_deleted = 0 AND created_at < ?2
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
            )?;
            let mut rows = stmt
                .query_map(
                    params![conversation_id, before.unwrap_or(i64::MAX), limit],
                    map_message,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            attach_receipts(conn, &mut rows)?;
            Ok(rows)
        })
    }

    pub fn get_direct_message(&self, id: &str) -> Result<Option<DirectMessageRow>> {
        self.with_conn(|conn| load_message(conn, id))
    }

    /// Adds a read receipt for `user_id` to every unread message from other
    /// senders. Returns how many messages were marked.
    pub fn mark_conversation_read(&self, conversation_id: &str, user_id: &str, now: i64) -> Result<u64> {
        self.with_conn_mut(|conn| {
            let marked = conn.execute(
                "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
                 SELECT id, ?2, ?3 FROM direct_messages
                 WHERE conversation_id = ?1 AND sender_id != ?2 AND is_deleted = 0",
                params![conversation_id, user_id, now],
            )?;
            Ok(marked as u64)
        })
    }

    /// Returns false if the message does not exist or was deleted.
    pub fn edit_direct_message(&self, id: &str, content: &str, now: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE direct_messages SET content = ?2, edited_at = ?3
                 WHERE id = ?1 AND is_deleted = 0",
                params![id, content, now],
            )?;
            Ok(updated > 0)
        })
    }

    /// Soft-deletes a message. If it was the conversation's last message, the
    /// newest remaining message takes its place.
    pub fn soft_delete_direct_message(&self, id: &str) -> Result<DeleteOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let conversation_id: Option<String> = tx
                .query_row(
                    "SELECT conversation_id FROM direct_messages WHERE id = ?1 AND is_deleted = 0",
                    [id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(conversation_id) = conversation_id else {
                return Ok(DeleteOutcome::NotFound);
            };

            tx.execute("UPDATE direct_messages SET is_deleted = 1 WHERE id = ?1", [id])?;
            tx.execute(
                "UPDATE conversations SET last_message_id = (
                     SELECT m.id FROM direct_messages m
                     WHERE m.conversation_id = ?1 AND m.is_deleted = 0
                     ORDER BY m.created_at DESC, m.rowid DESC LIMIT 1)
                 WHERE id = ?1 AND last_message_id = ?2",
                params![conversation_id, id],
            )?;
            tx.commit()?;

            Ok(DeleteOutcome::Deleted { conversation_id })
        })
    }
}

fn participants(conn: &Connection, conversation_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM conversation_participants
         WHERE conversation_id = ?1 ORDER BY joined_at, user_id",
    )?;
    let ids = stmt
        .query_map([conversation_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(ids)
}

fn load_conversation(conn: &Connection, id: &str, viewer: &str) -> Result<Option<ConversationRow>> {
    let head: Option<(Option<String>, i64, i64)> = conn
        .query_row(
            "SELECT last_message_id, last_activity, created_at FROM conversations WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let Some((last_message_id, last_activity, created_at)) = head else {
        return Ok(None);
    };

    let last_message = match last_message_id {
        Some(mid) => load_message(conn, &mid)?.filter(|m| !m.is_deleted),
        None => None,
    };

    let unread: i64 = conn.query_row(
        "SELECT COUNT(*) FROM direct_messages m
         WHERE m.conversation_id = ?1 AND m.sender_id != ?2 AND m.is_deleted = 0
           AND NOT EXISTS (SELECT 1 FROM message_reads r
                           WHERE r.message_id = m.id AND r.user_id = ?2)",
        params![id, viewer],
        |row| row.get(0),
    )?;

    Ok(Some(ConversationRow {
        id: id.to_string(),
        participants: participants(conn, id)?,
        last_message,
        last_activity,
        created_at,
        unread_count: unread as u64,
    }))
}

fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<DirectMessageRow> {
    Ok(DirectMessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_username: row.get(3)?,
        content: row.get(4)?,
        is_deleted: row.get::<_, i64>(5)? != 0,
        edited_at: row.get(6)?,
        created_at: row.get(7)?,
        read_by: Vec::new(),
    })
}

fn load_message(conn: &Connection, id: &str) -> Result<Option<DirectMessageRow>> {
    let row = conn
        .query_row(
            "SELECT id, conversation_id, sender_id, sender_username, content, is_deleted, edited_at, created_at
             FROM direct_messages WHERE id = ?1",
            [id],
            map_message,
        )
        .optional()?;

    match row {
        Some(row) => {
            let mut rows = vec![row];
            attach_receipts(conn, &mut rows)?;
            Ok(rows.pop())
        }
        None => Ok(None),
    }
}

/// Batch-fetch read receipts for a page of messages.
fn attach_receipts(conn: &Connection, rows: &mut [DirectMessageRow]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let sql = format!(
        "SELECT message_id, user_id, read_at FROM message_reads
         WHERE message_id IN ({}) ORDER BY read_at",
        placeholders(1, rows.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids: Vec<&dyn rusqlite::types::ToSql> =
        rows.iter().map(|r| &r.id as &dyn rusqlite::types::ToSql).collect();

    let mut receipts: HashMap<String, Vec<(String, i64)>> = HashMap::new();
    let mapped = stmt.query_map(ids.as_slice(), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
    })?;
    for entry in mapped {
        let (message_id, user_id, read_at) = entry?;
        receipts.entry(message_id).or_default().push((user_id, read_at));
    }

    for row in rows.iter_mut() {
        row.read_by = receipts.remove(&row.id).unwrap_or_default();
    }
    Ok(())
}
