use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (messaging + community)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE conversations (
                id               TEXT PRIMARY KEY,
                participant_key  TEXT NOT NULL,
                last_message_id  TEXT,
                last_activity    INTEGER NOT NULL,
                created_at       INTEGER NOT NULL
            );

            CREATE INDEX idx_conversations_key ON conversations(participant_key);

            CREATE TABLE conversation_participants (
                conversation_id  TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                user_id          TEXT NOT NULL,
                joined_at        INTEGER NOT NULL,
                PRIMARY KEY (conversation_id, user_id)
            );

            CREATE INDEX idx_participants_user ON conversation_participants(user_id);

            CREATE TABLE direct_messages (
                id               TEXT PRIMARY KEY,
                conversation_id  TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                sender_id        TEXT NOT NULL,
                sender_username  TEXT NOT NULL,
                content          TEXT NOT NULL,
                is_deleted       INTEGER NOT NULL DEFAULT 0,
                edited_at        INTEGER,
                created_at       INTEGER NOT NULL
            );

            CREATE INDEX idx_direct_messages_conversation
                ON direct_messages(conversation_id, created_at);

            CREATE TABLE message_reads (
                message_id  TEXT NOT NULL REFERENCES direct_messages(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL,
                read_at     INTEGER NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            CREATE TABLE channels (
                id           TEXT PRIMARY KEY,
                name         TEXT NOT NULL UNIQUE COLLATE NOCASE,
                description  TEXT NOT NULL DEFAULT '',
                kind         TEXT NOT NULL,
                created_by   TEXT NOT NULL,
                created_at   INTEGER NOT NULL
            );

            CREATE TABLE channel_members (
                channel_id  TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL,
                joined_at   INTEGER NOT NULL,
                PRIMARY KEY (channel_id, user_id)
            );

            CREATE TABLE channel_messages (
                id               TEXT PRIMARY KEY,
                channel_id       TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
                author_id        TEXT NOT NULL,
                author_username  TEXT NOT NULL,
                content          TEXT NOT NULL,
                created_at       INTEGER NOT NULL
            );

            CREATE INDEX idx_channel_messages_channel
                ON channel_messages(channel_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (dex)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE swaps (
                tx_hash       TEXT PRIMARY KEY,
                user_address  TEXT NOT NULL,
                token_in      TEXT NOT NULL,
                token_out     TEXT NOT NULL,
                base_token    TEXT NOT NULL,
                quote_token   TEXT NOT NULL,
                amount_in     REAL NOT NULL,
                amount_out    REAL NOT NULL,
                price         REAL NOT NULL,
                base_volume   REAL NOT NULL,
                quote_volume  REAL NOT NULL,
                gas_used      INTEGER,
                gas_price     REAL,
                slippage      REAL NOT NULL DEFAULT 0,
                status        TEXT NOT NULL DEFAULT 'pending',
                block_number  INTEGER,
                timestamp     INTEGER NOT NULL,
                created_at    INTEGER NOT NULL,
                updated_at    INTEGER NOT NULL
            );

            CREATE INDEX idx_swaps_pair
                ON swaps(base_token, quote_token, status, timestamp);
            CREATE INDEX idx_swaps_user ON swaps(user_address, timestamp);

            CREATE TABLE trading_pairs (
                base_token          TEXT NOT NULL,
                quote_token         TEXT NOT NULL,
                last_price          REAL NOT NULL,
                total_base_volume   REAL NOT NULL DEFAULT 0,
                total_quote_volume  REAL NOT NULL DEFAULT 0,
                trade_count         INTEGER NOT NULL DEFAULT 0,
                first_trade_at      INTEGER NOT NULL,
                last_trade_at       INTEGER NOT NULL,
                PRIMARY KEY (base_token, quote_token)
            );

            CREATE TABLE token_prices (
                token          TEXT PRIMARY KEY,
                counter_token  TEXT NOT NULL,
                last_price     REAL NOT NULL,
                open_price     REAL NOT NULL,
                high_price     REAL NOT NULL,
                low_price      REAL NOT NULL,
                day            TEXT NOT NULL,
                updated_at     INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (2);

            COMMIT;
            ",
        )?;
    }

    if version < 3 {
        info!("Running migration v3 (quests + points + nft)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE quests (
                id             TEXT PRIMARY KEY,
                title          TEXT NOT NULL,
                description    TEXT NOT NULL DEFAULT '',
                reward_points  INTEGER NOT NULL DEFAULT 0,
                start_at       INTEGER NOT NULL,
                end_at         INTEGER NOT NULL,
                status         TEXT NOT NULL DEFAULT 'draft',
                created_by     TEXT NOT NULL,
                created_at     INTEGER NOT NULL,
                updated_at     INTEGER NOT NULL
            );

            CREATE TABLE quest_tasks (
                id        TEXT PRIMARY KEY,
                quest_id  TEXT NOT NULL REFERENCES quests(id) ON DELETE CASCADE,
                title     TEXT NOT NULL,
                kind      TEXT NOT NULL,
                points    INTEGER NOT NULL DEFAULT 0,
                position  INTEGER NOT NULL,
                UNIQUE (quest_id, position)
            );

            CREATE TABLE quest_participants (
                quest_id       TEXT NOT NULL REFERENCES quests(id) ON DELETE CASCADE,
                user_id        TEXT NOT NULL,
                joined_at      INTEGER NOT NULL,
                points_earned  INTEGER NOT NULL DEFAULT 0,
                completed_at   INTEGER,
                PRIMARY KEY (quest_id, user_id)
            );

            CREATE TABLE quest_task_completions (
                task_id       TEXT NOT NULL REFERENCES quest_tasks(id) ON DELETE CASCADE,
                user_id       TEXT NOT NULL,
                completed_at  INTEGER NOT NULL,
                PRIMARY KEY (task_id, user_id)
            );

            CREATE TABLE points_accounts (
                user_id          TEXT PRIMARY KEY,
                balance          INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
                lifetime_earned  INTEGER NOT NULL DEFAULT 0,
                updated_at       INTEGER NOT NULL
            );

            CREATE TABLE points_ledger (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                delta       INTEGER NOT NULL,
                reason      TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_points_ledger_user ON points_ledger(user_id, created_at);

            CREATE TABLE points_conversions (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL,
                points          INTEGER NOT NULL,
                token_amount    REAL NOT NULL,
                rate            INTEGER NOT NULL,
                wallet_address  TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'pending',
                reason          TEXT,
                tx_hash         TEXT,
                reviewed_by     TEXT,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL
            );

            CREATE INDEX idx_conversions_status ON points_conversions(status, created_at);
            CREATE INDEX idx_conversions_user ON points_conversions(user_id, created_at);

            CREATE TABLE settings (
                key    TEXT PRIMARY KEY,
                value  TEXT NOT NULL
            );

            CREATE TABLE nft_visibility (
                contract    TEXT NOT NULL,
                token_id    TEXT NOT NULL,
                hidden      INTEGER NOT NULL DEFAULT 0,
                featured    INTEGER NOT NULL DEFAULT 0,
                updated_by  TEXT NOT NULL,
                updated_at  INTEGER NOT NULL,
                PRIMARY KEY (contract, token_id)
            );

            INSERT INTO schema_version (version) VALUES (3);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 3);
    }
}
