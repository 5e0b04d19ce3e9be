use anyhow::Result;
use rusqlite::{Connection, params};
use uuid::Uuid;

use agora_types::api::ConversionSettings;
use agora_types::models::ConversionStatus;

use super::OptionalExt;
use crate::Database;
use crate::models::{ConversionRow, PointsAccountRow};

const SETTING_POINTS_PER_TOKEN: &str = "conversion.points_per_token";
const SETTING_MIN_POINTS: &str = "conversion.min_points";
const SETTING_ENABLED: &str = "conversion.enabled";

pub enum AdjustOutcome {
    InsufficientBalance { balance: i64 },
    /// The resulting balance would not fit.
    Overflow { balance: i64 },
    Adjusted(PointsAccountRow),
}

pub enum RequestOutcome {
    Disabled,
    BelowMinimum { min_points: i64 },
    InsufficientBalance { balance: i64 },
    Created(ConversionRow),
}

pub enum ConversionOutcome {
    NotFound,
    InvalidTransition { current: String },
    Updated(ConversionRow),
}

/// Review action applied by an admin to a conversion request.
pub enum Review<'a> {
    Approve,
    Reject { reason: &'a str },
    Complete { tx_hash: &'a str },
}

impl Review<'_> {
    fn target(&self) -> ConversionStatus {
        match self {
            Review::Approve => ConversionStatus::Approved,
            Review::Reject { .. } => ConversionStatus::Rejected,
            Review::Complete { .. } => ConversionStatus::Completed,
        }
    }
}

const CONVERSION_COLUMNS: &str = "id, user_id, points, token_amount, rate, wallet_address, status,
     reason, tx_hash, reviewed_by, created_at, updated_at";

impl Database {
    // -- Balances --

    pub fn get_points_account(&self, user_id: &str) -> Result<Option<PointsAccountRow>> {
        self.with_conn(|conn| load_account(conn, user_id))
    }

    /// Applies a signed adjustment. The balance never goes below zero.
    pub fn adjust_points(&self, user_id: &str, delta: i64, reason: &str, now: i64) -> Result<AdjustOutcome> {
        self.with_conn_mut(|conn| {
            let balance = load_account(conn, user_id)?.map_or(0, |a| a.balance);
            match balance.checked_add(delta) {
                None => return Ok(AdjustOutcome::Overflow { balance }),
                Some(next) if next < 0 => return Ok(AdjustOutcome::InsufficientBalance { balance }),
                Some(_) => {}
            }

            let tx = conn.unchecked_transaction()?;
            credit_points(&tx, user_id, delta, reason, now)?;
            tx.commit()?;

            let account = load_account(conn, user_id)?
                .ok_or_else(|| anyhow::anyhow!("Points account not persisted: {}", user_id))?;
            Ok(AdjustOutcome::Adjusted(account))
        })
    }

    // -- Settings --

    /// Writes the defaults unless settings already exist.
    pub fn seed_conversion_settings(&self, defaults: &ConversionSettings) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            for (key, value) in settings_pairs(defaults) {
                tx.execute(
                    "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_conversion_settings(&self) -> Result<ConversionSettings> {
        self.with_conn(load_settings)
    }

    pub fn put_conversion_settings(&self, settings: &ConversionSettings) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            for (key, value) in settings_pairs(settings) {
                tx.execute(
                    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    // -- Conversions --

    /// Reserves `points` from the user's balance and records a pending
    /// conversion at the current rate, atomically.
    pub fn request_conversion(
        &self,
        id: &str,
        user_id: &str,
        points: i64,
        wallet_address: &str,
        now: i64,
    ) -> Result<RequestOutcome> {
        self.with_conn_mut(|conn| {
            let settings = load_settings(conn)?;
            if !settings.enabled {
                return Ok(RequestOutcome::Disabled);
            }
            if points < settings.min_points {
                return Ok(RequestOutcome::BelowMinimum {
                    min_points: settings.min_points,
                });
            }
            let balance = load_account(conn, user_id)?.map_or(0, |a| a.balance);
            if points > balance {
                return Ok(RequestOutcome::InsufficientBalance { balance });
            }

            let token_amount = points as f64 / settings.points_per_token as f64;

            let tx = conn.unchecked_transaction()?;
            credit_points(&tx, user_id, -points, &format!("conversion:{}", id), now)?;
            tx.execute(
                "INSERT INTO points_conversions (id, user_id, points, token_amount, rate, wallet_address,
                     status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)",
                params![id, user_id, points, token_amount, settings.points_per_token, wallet_address, now],
            )?;
            tx.commit()?;

            let row = load_conversion(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("Conversion not persisted: {}", id))?;
            Ok(RequestOutcome::Created(row))
        })
    }

    /// Applies an admin review. Rejection refunds the reserved points in the
    /// same transaction.
    pub fn review_conversion(
        &self,
        id: &str,
        review: Review<'_>,
        reviewer: &str,
        now: i64,
    ) -> Result<ConversionOutcome> {
        self.with_conn_mut(|conn| {
            let Some(current) = load_conversion(conn, id)? else {
                return Ok(ConversionOutcome::NotFound);
            };

            let next = review.target();
            let allowed = current
                .status
                .parse::<ConversionStatus>()
                .map(|s| s.can_transition_to(next))
                .unwrap_or(false);
            if !allowed {
                return Ok(ConversionOutcome::InvalidTransition { current: current.status });
            }

            let tx = conn.unchecked_transaction()?;
            match review {
                Review::Approve => {
                    tx.execute(
                        "UPDATE points_conversions SET status = 'approved', reviewed_by = ?2, updated_at = ?3
                         WHERE id = ?1",
                        params![id, reviewer, now],
                    )?;
                }
                Review::Reject { reason } => {
                    tx.execute(
                        "UPDATE points_conversions SET status = 'rejected', reason = ?2, reviewed_by = ?3,
                             updated_at = ?4
                         WHERE id = ?1",
                        params![id, reason, reviewer, now],
                    )?;
                    refund_points(&tx, &current.user_id, current.points, id, now)?;
                }
                Review::Complete { tx_hash } => {
                    tx.execute(
                        "UPDATE points_conversions SET status = 'completed', tx_hash = ?2, reviewed_by = ?3,
                             updated_at = ?4
                         WHERE id = ?1",
                        params![id, tx_hash, reviewer, now],
                    )?;
                }
            }
            tx.commit()?;

            let row = load_conversion(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("Conversion vanished: {}", id))?;
            Ok(ConversionOutcome::Updated(row))
        })
    }

    pub fn list_conversions_for_user(&self, user_id: &str) -> Result<Vec<ConversionRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CONVERSION_COLUMNS} FROM points_conversions
                 WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_conversion)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_conversions(
        &self,
        status: Option<ConversionStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversionRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CONVERSION_COLUMNS} FROM points_conversions
                 WHERE (?1 IS NULL OR status = ?1)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![status.map(|s| s.as_str()), limit, offset], map_conversion)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// (status, count, point sum) for every status that has conversions.
    pub fn conversion_stats(&self) -> Result<Vec<(String, i64, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*), COALESCE(SUM(points), 0) FROM points_conversions GROUP BY status",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Adds `delta` to a user's balance and writes a ledger entry. Positive
/// deltas also count toward lifetime earnings. Callers must run this inside
/// a transaction and check the balance beforehand for negative deltas.
pub(crate) fn credit_points(conn: &Connection, user_id: &str, delta: i64, reason: &str, now: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO points_accounts (user_id, balance, lifetime_earned, updated_at)
         VALUES (?1, 0, 0, ?2)
         ON CONFLICT (user_id) DO NOTHING",
        params![user_id, now],
    )?;
    conn.execute(
        "UPDATE points_accounts
         SET balance = balance + ?2,
             lifetime_earned = lifetime_earned + MAX(?2, 0),
             updated_at = ?3
         WHERE user_id = ?1",
        params![user_id, delta, now],
    )?;
    conn.execute(
        "INSERT INTO points_ledger (id, user_id, delta, reason, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![Uuid::new_v4().to_string(), user_id, delta, reason, now],
    )?;
    Ok(())
}

/// Returns reserved points without counting them as new earnings.
fn refund_points(conn: &Connection, user_id: &str, points: i64, conversion_id: &str, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE points_accounts SET balance = balance + ?2, updated_at = ?3 WHERE user_id = ?1",
        params![user_id, points, now],
    )?;
    conn.execute(
        "INSERT INTO points_ledger (id, user_id, delta, reason, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            Uuid::new_v4().to_string(),
            user_id,
            points,
            format!("conversion-refund:{}", conversion_id),
            now
        ],
    )?;
    Ok(())
}

fn load_account(conn: &Connection, user_id: &str) -> Result<Option<PointsAccountRow>> {
    conn.query_row(
        "SELECT user_id, balance, lifetime_earned, updated_at FROM points_accounts WHERE user_id = ?1",
        [user_id],
        |row| {
            Ok(PointsAccountRow {
                user_id: row.get(0)?,
                balance: row.get(1)?,
                lifetime_earned: row.get(2)?,
                updated_at: row.get(3)?,
            })
        },
    )
    .optional()
}

fn map_conversion(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversionRow> {
    Ok(ConversionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        points: row.get(2)?,
        token_amount: row.get(3)?,
        rate: row.get(4)?,
        wallet_address: row.get(5)?,
        status: row.get(6)?,
        reason: row.get(7)?,
        tx_hash: row.get(8)?,
        reviewed_by: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn load_conversion(conn: &Connection, id: &str) -> Result<Option<ConversionRow>> {
    let sql = format!("SELECT {CONVERSION_COLUMNS} FROM points_conversions WHERE id = ?1");
    conn.query_row(&sql, [id], map_conversion).optional()
}

fn settings_pairs(settings: &ConversionSettings) -> [(&'static str, String); 3] {
    [
        (SETTING_POINTS_PER_TOKEN, settings.points_per_token.to_string()),
        (SETTING_MIN_POINTS, settings.min_points.to_string()),
        (SETTING_ENABLED, settings.enabled.to_string()),
    ]
}

fn load_settings(conn: &Connection) -> Result<ConversionSettings> {
    let get = |key: &str| -> Result<Option<String>> {
        conn.query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get(0))
            .optional()
    };

    Ok(ConversionSettings {
        points_per_token: get(SETTING_POINTS_PER_TOKEN)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(100),
        min_points: get(SETTING_MIN_POINTS)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000),
        enabled: get(SETTING_ENABLED)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(true),
    })
}
