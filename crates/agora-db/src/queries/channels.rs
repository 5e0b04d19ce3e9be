use anyhow::Result;
use rusqlite::{Connection, params};

use super::{OptionalExt, placeholders};
use crate::Database;
use crate::models::{ChannelMessageRow, ChannelRow};

impl Database {
    // -- Channels --

    /// Creates a channel with its creator as first member. Returns `None`
    /// when the name is already taken (case-insensitive).
    pub fn create_channel(
        &self,
        id: &str,
        name: &str,
        description: &str,
        kind: &str,
        created_by: &str,
        now: i64,
    ) -> Result<Option<ChannelRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO channels (id, name, description, kind, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, name, description, kind, created_by, now],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            tx.execute(
                "INSERT INTO channel_members (channel_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                params![id, created_by, now],
            )?;
            tx.commit()?;
            load_channel(conn, id, created_by)
        })
    }

    pub fn get_channel(&self, id: &str, viewer: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| load_channel(conn, id, viewer))
    }

    pub fn list_channels(&self, viewer: &str) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let sql = format!("{CHANNEL_SELECT} ORDER BY c.created_at, c.name");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([viewer], map_channel)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Idempotent. Returns true if the user was newly added.
    pub fn join_channel(&self, channel_id: &str, user_id: &str, now: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let added = conn.execute(
                "INSERT OR IGNORE INTO channel_members (channel_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                params![channel_id, user_id, now],
            )?;
            Ok(added > 0)
        })
    }

    /// Idempotent. Returns true if the user was a member.
    pub fn leave_channel(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                params![channel_id, user_id],
            )?;
            Ok(removed > 0)
        })
    }

    /// Of the given channels, those whose events `user_id` may receive:
    /// announcement channels and group channels the user belongs to.
    pub fn readable_channels(&self, user_id: &str, channel_ids: &[String]) -> Result<Vec<String>> {
        if channel_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT c.id FROM channels c
                 WHERE c.id IN ({})
                   AND (c.kind = 'announcement'
                        OR EXISTS (SELECT 1 FROM channel_members m
                                   WHERE m.channel_id = c.id AND m.user_id = ?1))",
                placeholders(2, channel_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&user_id];
            params.extend(channel_ids.iter().map(|id| id as &dyn rusqlite::types::ToSql));

            let rows = stmt
                .query_map(params.as_slice(), |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    // -- Channel messages --

    pub fn insert_channel_message(
        &self,
        id: &str,
        channel_id: &str,
        author_id: &str,
        author_username: &str,
        content: &str,
        now: i64,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO channel_messages (id, channel_id, author_id, author_username, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, channel_id, author_id, author_username, content, now],
            )?;
            Ok(())
        })
    }

    pub fn get_channel_messages(
        &self,
        channel_id: &str,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<ChannelMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, channel_id, author_id, author_username, content, created_at
                 FROM channel_messages
                 WHERE channel_id = ?1 AND created_at < ?2
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(params![channel_id, before.unwrap_or(i64::MAX), limit], |row| {
                    Ok(ChannelMessageRow {
                        id: row.get(0)?,
                        channel_id: row.get(1)?,
                        author_id: row.get(2)?,
                        author_username: row.get(3)?,
                        content: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

const CHANNEL_SELECT: &str = "SELECT c.id, c.name, c.description, c.kind, c.created_by, c.created_at,
        (SELECT COUNT(*) FROM channel_members m WHERE m.channel_id = c.id),
        EXISTS (SELECT 1 FROM channel_members m WHERE m.channel_id = c.id AND m.user_id = ?1)
     FROM channels c";

fn map_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        kind: row.get(3)?,
        created_by: row.get(4)?,
        created_at: row.get(5)?,
        member_count: row.get::<_, i64>(6)? as u64,
        is_member: row.get::<_, i64>(7)? != 0,
    })
}

fn load_channel(conn: &Connection, id: &str, viewer: &str) -> Result<Option<ChannelRow>> {
    let sql = format!("{CHANNEL_SELECT} WHERE c.id = ?2");
    conn.query_row(&sql, params![viewer, id], map_channel).optional()
}
