use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::debug;

use agora_types::models::SwapStatus;

use super::OptionalExt;
use crate::Database;
use crate::chart::{PricePoint, orient_swap};
use crate::models::{SwapRow, TokenPriceRow, TradingPairRow};

/// Validated swap ready for storage. Addresses are lowercase.
#[derive(Debug, Clone)]
pub struct NewSwap {
    pub tx_hash: String,
    pub user_address: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
    pub amount_out: f64,
    pub gas_used: Option<i64>,
    pub gas_price: Option<f64>,
    pub slippage: f64,
    pub status: SwapStatus,
    pub block_number: Option<i64>,
    pub timestamp: i64,
}

pub enum RecordOutcome {
    /// A swap with this tx hash already exists
    Duplicate,
    Recorded(SwapRow),
}

pub enum SwapUpdateOutcome {
    NotFound,
    InvalidTransition { current: String },
    Updated(SwapRow),
}

const SWAP_COLUMNS: &str = "tx_hash, user_address, token_in, token_out, base_token, quote_token,
     amount_in, amount_out, price, base_volume, quote_volume, gas_used, gas_price, slippage,
     status, block_number, timestamp, created_at, updated_at";

impl Database {
    /// Inserts a swap. A swap recorded as completed is aggregated into its
    /// pair and token prices in the same transaction.
    pub fn record_swap(&self, swap: &NewSwap, now: i64) -> Result<RecordOutcome> {
        let (base, quote, base_volume, quote_volume, price) =
            orient_swap(&swap.token_in, &swap.token_out, swap.amount_in, swap.amount_out);

        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO swaps (tx_hash, user_address, token_in, token_out, base_token, quote_token,
                     amount_in, amount_out, price, base_volume, quote_volume, gas_used, gas_price, slippage,
                     status, block_number, timestamp, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)",
                params![
                    swap.tx_hash,
                    swap.user_address,
                    swap.token_in,
                    swap.token_out,
                    base,
                    quote,
                    swap.amount_in,
                    swap.amount_out,
                    price,
                    base_volume,
                    quote_volume,
                    swap.gas_used,
                    swap.gas_price,
                    swap.slippage,
                    swap.status.as_str(),
                    swap.block_number,
                    swap.timestamp,
                    now,
                ],
            )?;

            if inserted == 0 {
                return Ok(RecordOutcome::Duplicate);
            }

            let row = load_swap(&tx, &swap.tx_hash)?
                .ok_or_else(|| anyhow::anyhow!("Swap not persisted: {}", swap.tx_hash))?;
            if swap.status == SwapStatus::Completed {
                apply_completion(&tx, &row)?;
            }
            tx.commit()?;
            Ok(RecordOutcome::Recorded(row))
        })
    }

    /// Settles a pending swap. Completion updates the pair aggregate and
    /// token price snapshots atomically with the status change.
    pub fn update_swap_status(
        &self,
        tx_hash: &str,
        next: SwapStatus,
        block_number: Option<i64>,
        gas_used: Option<i64>,
        now: i64,
    ) -> Result<SwapUpdateOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(current) = load_swap(&tx, tx_hash)? else {
                return Ok(SwapUpdateOutcome::NotFound);
            };

            let allowed = current
                .status
                .parse::<SwapStatus>()
                .map(|s| s.can_transition_to(next))
                .unwrap_or(false);
            if !allowed {
                return Ok(SwapUpdateOutcome::InvalidTransition { current: current.status });
            }

            tx.execute(
                "UPDATE swaps SET status = ?2,
                     block_number = COALESCE(?3, block_number),
                     gas_used = COALESCE(?4, gas_used),
                     updated_at = ?5
                 WHERE tx_hash = ?1",
                params![tx_hash, next.as_str(), block_number, gas_used, now],
            )?;

            let row = load_swap(&tx, tx_hash)?
                .ok_or_else(|| anyhow::anyhow!("Swap vanished: {}", tx_hash))?;
            if next == SwapStatus::Completed {
                apply_completion(&tx, &row)?;
            }
            tx.commit()?;
            Ok(SwapUpdateOutcome::Updated(row))
        })
    }

    pub fn get_swap(&self, tx_hash: &str) -> Result<Option<SwapRow>> {
        self.with_conn(|conn| load_swap(conn, tx_hash))
    }

    pub fn list_swaps_by_user(
        &self,
        user_address: &str,
        status: Option<SwapStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<SwapRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SWAP_COLUMNS} FROM swaps
                 WHERE user_address = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY timestamp DESC, rowid DESC
                 LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![user_address, status.map(|s| s.as_str()), limit, offset],
                    map_swap,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_recent_swaps(&self, limit: u32) -> Result<Vec<SwapRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SWAP_COLUMNS} FROM swaps ORDER BY timestamp DESC, rowid DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], map_swap)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Completed swaps of a canonical pair with `from <= timestamp < to`,
    /// oldest first.
    pub fn pair_price_points(
        &self,
        base: &str,
        quote: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<PricePoint>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, price, base_volume, quote_volume FROM swaps
                 WHERE base_token = ?1 AND quote_token = ?2 AND status = 'completed'
                   AND timestamp >= ?3 AND timestamp < ?4
                 ORDER BY timestamp ASC, rowid ASC",
            )?;
            let points = stmt
                .query_map(params![base, quote, from, to], |row| {
                    Ok(PricePoint {
                        timestamp: row.get(0)?,
                        price: row.get(1)?,
                        base_volume: row.get(2)?,
                        quote_volume: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(points)
        })
    }

    pub fn get_trading_pair(&self, base: &str, quote: &str) -> Result<Option<TradingPairRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT base_token, quote_token, last_price, total_base_volume, total_quote_volume,
                        trade_count, first_trade_at, last_trade_at
                 FROM trading_pairs WHERE base_token = ?1 AND quote_token = ?2",
                params![base, quote],
                map_pair,
            )
            .optional()
        })
    }

    pub fn list_trading_pairs(&self, limit: u32, offset: u32) -> Result<Vec<TradingPairRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT base_token, quote_token, last_price, total_base_volume, total_quote_volume,
                        trade_count, first_trade_at, last_trade_at
                 FROM trading_pairs
                 ORDER BY total_quote_volume DESC, trade_count DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt
                .query_map(params![limit, offset], map_pair)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_token_price(&self, token: &str) -> Result<Option<TokenPriceRow>> {
        self.with_conn(|conn| load_token_price(conn, token))
    }
}

fn map_swap(row: &rusqlite::Row<'_>) -> rusqlite::Result<SwapRow> {
    Ok(SwapRow {
        tx_hash: row.get(0)?,
        user_address: row.get(1)?,
        token_in: row.get(2)?,
        token_out: row.get(3)?,
        base_token: row.get(4)?,
        quote_token: row.get(5)?,
        amount_in: row.get(6)?,
        amount_out: row.get(7)?,
        price: row.get(8)?,
        base_volume: row.get(9)?,
        quote_volume: row.get(10)?,
        gas_used: row.get(11)?,
        gas_price: row.get(12)?,
        slippage: row.get(13)?,
        status: row.get(14)?,
        block_number: row.get(15)?,
        timestamp: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

fn map_pair(row: &rusqlite::Row<'_>) -> rusqlite::Result<TradingPairRow> {
    Ok(TradingPairRow {
        base_token: row.get(0)?,
        quote_token: row.get(1)?,
        last_price: row.get(2)?,
        total_base_volume: row.get(3)?,
        total_quote_volume: row.get(4)?,
        trade_count: row.get(5)?,
        first_trade_at: row.get(6)?,
        last_trade_at: row.get(7)?,
    })
}

fn load_swap(conn: &Connection, tx_hash: &str) -> Result<Option<SwapRow>> {
    let sql = format!("SELECT {SWAP_COLUMNS} FROM swaps WHERE tx_hash = ?1");
    conn.query_row(&sql, [tx_hash], map_swap).optional()
}

fn load_token_price(conn: &Connection, token: &str) -> Result<Option<TokenPriceRow>> {
    conn.query_row(
        "SELECT token, counter_token, last_price, open_price, high_price, low_price, day, updated_at
         FROM token_prices WHERE token = ?1",
        [token],
        |row| {
            Ok(TokenPriceRow {
                token: row.get(0)?,
                counter_token: row.get(1)?,
                last_price: row.get(2)?,
                open_price: row.get(3)?,
                high_price: row.get(4)?,
                low_price: row.get(5)?,
                day: row.get(6)?,
                updated_at: row.get(7)?,
            })
        },
    )
    .optional()
}

/// Folds a completed swap into the pair aggregate and both token snapshots.
fn apply_completion(conn: &Connection, swap: &SwapRow) -> Result<()> {
    conn.execute(
        "INSERT INTO trading_pairs (base_token, quote_token, last_price, total_base_volume,
             total_quote_volume, trade_count, first_trade_at, last_trade_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
         ON CONFLICT (base_token, quote_token) DO UPDATE SET
             last_price = CASE WHEN excluded.last_trade_at >= trading_pairs.last_trade_at
                               THEN excluded.last_price ELSE trading_pairs.last_price END,
             total_base_volume = trading_pairs.total_base_volume + excluded.total_base_volume,
             total_quote_volume = trading_pairs.total_quote_volume + excluded.total_quote_volume,
             trade_count = trading_pairs.trade_count + 1,
             first_trade_at = MIN(trading_pairs.first_trade_at, excluded.first_trade_at),
             last_trade_at = MAX(trading_pairs.last_trade_at, excluded.last_trade_at)",
        params![
            swap.base_token,
            swap.quote_token,
            swap.price,
            swap.base_volume,
            swap.quote_volume,
            swap.timestamp,
        ],
    )?;

    refresh_token_price(conn, &swap.base_token, &swap.quote_token, swap.price, swap.timestamp)?;
    if swap.price > 0.0 {
        refresh_token_price(conn, &swap.quote_token, &swap.base_token, 1.0 / swap.price, swap.timestamp)?;
    }
    Ok(())
}

/// Updates the daily snapshot of `token` priced in `counter`. A new UTC day
/// or a different counter token starts a fresh snapshot; trades older than
/// the snapshot are ignored.
fn refresh_token_price(conn: &Connection, token: &str, counter: &str, price: f64, ts: i64) -> Result<()> {
    let day = utc_day(ts);

    match load_token_price(conn, token)? {
        Some(existing) if existing.updated_at > ts => {
            debug!("Ignoring stale price for {} at {}", token, ts);
        }
        Some(existing) if existing.day == day && existing.counter_token == counter => {
            conn.execute(
                "UPDATE token_prices SET last_price = ?2,
                     high_price = MAX(high_price, ?2),
                     low_price = MIN(low_price, ?2),
                     updated_at = ?3
                 WHERE token = ?1",
                params![token, price, ts],
            )?;
        }
        _ => {
            conn.execute(
                "INSERT OR REPLACE INTO token_prices
                     (token, counter_token, last_price, open_price, high_price, low_price, day, updated_at)
                 VALUES (?1, ?2, ?3, ?3, ?3, ?3, ?4, ?5)",
                params![token, counter, price, day, ts],
            )?;
        }
    }
    Ok(())
}

fn utc_day(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ts)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WETH: &str = "0x00000000000000000000000000000000000000aa";
    const USDC: &str = "0x00000000000000000000000000000000000000bb";
    const DAY: i64 = 86_400_000;

    fn swap(tx: &str, token_in: &str, token_out: &str, amount_in: f64, amount_out: f64, ts: i64) -> NewSwap {
        NewSwap {
            tx_hash: tx.to_string(),
            user_address: "0x1111111111111111111111111111111111111111".to_string(),
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in,
            amount_out,
            gas_used: Some(21_000),
            gas_price: Some(12.5),
            slippage: 0.5,
            status: SwapStatus::Pending,
            block_number: None,
            timestamp: ts,
        }
    }

    #[test]
    fn test_duplicate_tx_hash() {
        let db = Database::open_in_memory().unwrap();
        let s = swap("0x01", WETH, USDC, 1.0, 2000.0, 1_000);
        assert!(matches!(db.record_swap(&s, 1_000).unwrap(), RecordOutcome::Recorded(_)));
        assert!(matches!(db.record_swap(&s, 1_001).unwrap(), RecordOutcome::Duplicate));
    }

    #[test]
    fn test_pending_swaps_do_not_aggregate() {
        let db = Database::open_in_memory().unwrap();
        db.record_swap(&swap("0x01", WETH, USDC, 1.0, 2000.0, 1_000), 1_000).unwrap();
        assert!(db.get_trading_pair(WETH, USDC).unwrap().is_none());
        assert!(db.pair_price_points(WETH, USDC, 0, i64::MAX).unwrap().is_empty());
    }

    #[test]
    fn test_completion_updates_pair_and_prices() {
        let db = Database::open_in_memory().unwrap();
        db.record_swap(&swap("0x01", WETH, USDC, 1.0, 2000.0, 1_000), 1_000).unwrap();
        db.record_swap(&swap("0x02", USDC, WETH, 4200.0, 2.0, 2_000), 2_000).unwrap();

        let out = db.update_swap_status("0x01", SwapStatus::Completed, Some(10), None, 3_000).unwrap();
        assert!(matches!(out, SwapUpdateOutcome::Updated(ref r) if r.status == "completed" && r.block_number == Some(10)));
        db.update_swap_status("0x02", SwapStatus::Completed, None, None, 3_100).unwrap();

        let pair = db.get_trading_pair(WETH, USDC).unwrap().unwrap();
        assert_eq!(pair.trade_count, 2);
        assert_eq!(pair.total_base_volume, 3.0);
        assert_eq!(pair.total_quote_volume, 6200.0);
        assert_eq!(pair.last_price, 2100.0);
        assert_eq!((pair.first_trade_at, pair.last_trade_at), (1_000, 2_000));

        let weth = db.get_token_price(WETH).unwrap().unwrap();
        assert_eq!(weth.counter_token, USDC);
        assert_eq!((weth.open_price, weth.high_price, weth.low_price, weth.last_price), (2000.0, 2100.0, 2000.0, 2100.0));

        let usdc = db.get_token_price(USDC).unwrap().unwrap();
        assert_eq!(usdc.last_price, 1.0 / 2100.0);
    }

    #[test]
    fn test_settled_swap_cannot_change() {
        let db = Database::open_in_memory().unwrap();
        db.record_swap(&swap("0x01", WETH, USDC, 1.0, 2000.0, 1_000), 1_000).unwrap();
        db.update_swap_status("0x01", SwapStatus::Failed, None, None, 2_000).unwrap();

        let out = db.update_swap_status("0x01", SwapStatus::Completed, None, None, 3_000).unwrap();
        assert!(matches!(out, SwapUpdateOutcome::InvalidTransition { ref current } if current == "failed"));
        assert!(matches!(
            db.update_swap_status("0x99", SwapStatus::Completed, None, None, 3_000).unwrap(),
            SwapUpdateOutcome::NotFound
        ));
        assert!(db.get_trading_pair(WETH, USDC).unwrap().is_none());
    }

    #[test]
    fn test_price_snapshot_resets_each_day() {
        let db = Database::open_in_memory().unwrap();
        let mut first = swap("0x01", WETH, USDC, 1.0, 2000.0, DAY - 10);
        first.status = SwapStatus::Completed;
        let mut second = swap("0x02", WETH, USDC, 1.0, 1500.0, DAY + 10);
        second.status = SwapStatus::Completed;
        let mut late = swap("0x03", WETH, USDC, 1.0, 9999.0, DAY - 5);
        late.status = SwapStatus::Completed;

        db.record_swap(&first, 0).unwrap();
        db.record_swap(&second, 0).unwrap();
        db.record_swap(&late, 0).unwrap();

        let weth = db.get_token_price(WETH).unwrap().unwrap();
        assert_eq!(weth.day, "1970-01-02");
        assert_eq!((weth.open_price, weth.high_price, weth.low_price), (1500.0, 1500.0, 1500.0));

        // The late trade still counts toward the pair aggregate, not the last price.
        let pair = db.get_trading_pair(WETH, USDC).unwrap().unwrap();
        assert_eq!(pair.trade_count, 3);
        assert_eq!(pair.last_price, 1500.0);
    }

    #[test]
    fn test_user_history_filters() {
        let db = Database::open_in_memory().unwrap();
        db.record_swap(&swap("0x01", WETH, USDC, 1.0, 2000.0, 1_000), 1_000).unwrap();
        db.record_swap(&swap("0x02", WETH, USDC, 1.0, 2000.0, 2_000), 2_000).unwrap();
        db.update_swap_status("0x02", SwapStatus::Completed, None, None, 2_500).unwrap();

        let user = "0x1111111111111111111111111111111111111111";
        let all = db.list_swaps_by_user(user, None, 10, 0).unwrap();
        assert_eq!(all.iter().map(|s| s.tx_hash.as_str()).collect::<Vec<_>>(), vec!["0x02", "0x01"]);

        let pending = db.list_swaps_by_user(user, Some(SwapStatus::Pending), 10, 0).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].tx_hash, "0x01");
        assert_eq!(db.list_recent_swaps(1).unwrap()[0].tx_hash, "0x02");
    }
}
