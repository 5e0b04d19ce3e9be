use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use agora_db::chart::{bucket_start, build_candles, canonical_pair, window_stats};
use agora_db::models::SwapRow;
use agora_db::queries::{NewSwap, RecordOutcome, SwapUpdateOutcome};
use agora_types::api::{
    ChartResponse, Claims, RecordSwapRequest, SwapResponse, TokenPriceResponse, TradingPairResponse,
    UpdateSwapStatusRequest,
};
use agora_types::events::GatewayEvent;
use agora_types::models::{ChartInterval, SwapStatus};
use agora_types::validate::{clamp_limit, is_evm_address, is_tx_hash, normalize_address};

use crate::error::{ApiError, ApiResult};
use crate::{AppState, PageQuery, convert, run_db};

pub const MAX_CHART_BUCKETS: i64 = 1000;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

fn address(raw: &str, field: &str) -> ApiResult<String> {
    let normalized = normalize_address(raw);
    if !is_evm_address(&normalized) {
        return Err(ApiError::bad_request(format!("{} is not a valid address", field)));
    }
    Ok(normalized)
}

fn tx_hash(raw: &str) -> ApiResult<String> {
    let normalized = normalize_address(raw);
    if !is_tx_hash(&normalized) {
        return Err(ApiError::bad_request("tx_hash is not a valid transaction hash"));
    }
    Ok(normalized)
}

fn positive_amount(value: f64, field: &str) -> ApiResult<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ApiError::bad_request(format!("{} must be a positive number", field)));
    }
    Ok(value)
}

fn to_i64(value: Option<u64>, field: &str) -> ApiResult<Option<i64>> {
    value
        .map(i64::try_from)
        .transpose()
        .map_err(|_| ApiError::bad_request(format!("{} is out of range", field)))
}

fn validate_swap(req: RecordSwapRequest) -> ApiResult<NewSwap> {
    let token_in = address(&req.token_in, "token_in")?;
    let token_out = address(&req.token_out, "token_out")?;
    if token_in == token_out {
        return Err(ApiError::bad_request("token_in and token_out must differ"));
    }
    if !req.slippage.is_finite() || !(0.0..=100.0).contains(&req.slippage) {
        return Err(ApiError::bad_request("slippage must be between 0 and 100"));
    }
    if let Some(gas_price) = req.gas_price {
        if !gas_price.is_finite() || gas_price < 0.0 {
            return Err(ApiError::bad_request("gas_price must be a non-negative number"));
        }
    }

    Ok(NewSwap {
        tx_hash: tx_hash(&req.tx_hash)?,
        user_address: address(&req.user_address, "user_address")?,
        token_in,
        token_out,
        amount_in: positive_amount(req.amount_in, "amount_in")?,
        amount_out: positive_amount(req.amount_out, "amount_out")?,
        gas_used: to_i64(req.gas_used, "gas_used")?,
        gas_price: req.gas_price,
        slippage: req.slippage,
        status: req.status.unwrap_or_default(),
        block_number: to_i64(req.block_number, "block_number")?,
        timestamp: req.timestamp.map(|t| t.timestamp_millis()).unwrap_or_else(agora_db::now_ms),
    })
}

fn announce_completion(state: &AppState, row: &SwapRow) {
    state.dispatcher.broadcast(GatewayEvent::SwapCompleted {
        tx_hash: row.tx_hash.clone(),
        base: row.base_token.clone(),
        quote: row.quote_token.clone(),
        price: row.price,
        timestamp: convert::datetime(row.timestamp),
    });
}

pub async fn record_swap(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RecordSwapRequest>,
) -> ApiResult<impl IntoResponse> {
    let swap = validate_swap(req)?;
    let now = agora_db::now_ms();

    let row = match run_db(&state, move |db| db.record_swap(&swap, now)).await? {
        RecordOutcome::Duplicate => return Err(ApiError::conflict("swap already recorded")),
        RecordOutcome::Recorded(row) => row,
    };

    info!("{} recorded swap {} ({})", claims.username, row.tx_hash, row.status);
    if row.status == SwapStatus::Completed.as_str() {
        announce_completion(&state, &row);
    }
    Ok((StatusCode::CREATED, Json(convert::swap(row))))
}

pub async fn update_swap_status(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Json(req): Json<UpdateSwapStatusRequest>,
) -> ApiResult<Json<SwapResponse>> {
    let hash = tx_hash(&hash)?;
    let block_number = to_i64(req.block_number, "block_number")?;
    let gas_used = to_i64(req.gas_used, "gas_used")?;
    let now = agora_db::now_ms();

    let outcome = run_db(&state, move |db| {
        db.update_swap_status(&hash, req.status, block_number, gas_used, now)
    })
    .await?;

    match outcome {
        SwapUpdateOutcome::NotFound => Err(ApiError::not_found("swap not found")),
        SwapUpdateOutcome::InvalidTransition { current } => Err(ApiError::conflict(format!(
            "swap is {} and cannot become {}",
            current, req.status
        ))),
        SwapUpdateOutcome::Updated(row) => {
            if req.status == SwapStatus::Completed {
                announce_completion(&state, &row);
            }
            Ok(Json(convert::swap(row)))
        }
    }
}

pub async fn get_swap(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<Json<SwapResponse>> {
    let hash = tx_hash(&hash)?;
    let row = run_db(&state, move |db| db.get_swap(&hash))
        .await?
        .ok_or_else(|| ApiError::not_found("swap not found"))?;
    Ok(Json(convert::swap(row)))
}

#[derive(Debug, Deserialize)]
pub struct UserSwapsQuery {
    pub status: Option<SwapStatus>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

pub async fn list_user_swaps(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(query): Query<UserSwapsQuery>,
) -> ApiResult<Json<Vec<SwapResponse>>> {
    let user = address(&user, "address")?;
    let limit = clamp_limit(query.limit);
    let rows = run_db(&state, move |db| {
        db.list_swaps_by_user(&user, query.status, limit, query.offset)
    })
    .await?;
    Ok(Json(rows.into_iter().map(convert::swap).collect()))
}

pub async fn list_recent_swaps(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<SwapResponse>>> {
    let limit = clamp_limit(page.limit);
    let rows = run_db(&state, move |db| db.list_recent_swaps(limit)).await?;
    Ok(Json(rows.into_iter().map(convert::swap).collect()))
}

// -- Analytics --

pub async fn list_pairs(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<TradingPairResponse>>> {
    let limit = clamp_limit(page.limit);
    let rows = run_db(&state, move |db| db.list_trading_pairs(limit, page.offset)).await?;
    Ok(Json(rows.into_iter().map(|row| convert::trading_pair(row, None)).collect()))
}

/// Pair aggregate plus statistics over the trailing 24 hours.
pub async fn get_pair(
    State(state): State<AppState>,
    Path((a, b)): Path<(String, String)>,
) -> ApiResult<Json<TradingPairResponse>> {
    let (base, quote) = canonical_pair(&address(&a, "token")?, &address(&b, "token")?);
    let now = agora_db::now_ms();

    let (row, points) = run_db(&state, move |db| {
        let Some(row) = db.get_trading_pair(&base, &quote)? else {
            return Ok((None, Vec::new()));
        };
        let points = db.pair_price_points(&base, &quote, now - DAY_MS, now + 1)?;
        Ok((Some(row), points))
    })
    .await?;

    let row = row.ok_or_else(|| ApiError::not_found("pair has never traded"))?;
    Ok(Json(convert::trading_pair(row, Some(window_stats(&points)))))
}

/// `from` and `to` are Unix milliseconds.
#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    pub interval: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
}

/// Rejects millisecond timestamps that `DateTime<Utc>` cannot represent.
fn timestamp(ms: Option<i64>, field: &str) -> ApiResult<Option<i64>> {
    match ms {
        Some(ms) if DateTime::<Utc>::from_timestamp_millis(ms).is_none() => {
            Err(ApiError::bad_request(format!("{} is out of range", field)))
        }
        other => Ok(other),
    }
}

/// Resolves the `[from, to)` window of a chart request.
///
/// Without `from`, the window covers the last 24 hours before `to`, shortened
/// for fine intervals so that it never touches more than `MAX_CHART_BUCKETS`
/// buckets.
pub fn chart_window(
    interval: ChartInterval,
    from: Option<i64>,
    to: Option<i64>,
    now: i64,
) -> ApiResult<(i64, i64)> {
    let interval_ms = interval.as_millis();
    let to = timestamp(to, "to")?.unwrap_or(now);
    let from = timestamp(from, "from")?.unwrap_or_else(|| to - DAY_MS.min((MAX_CHART_BUCKETS - 1) * interval_ms));

    if from > to {
        return Err(ApiError::bad_request("from must not be after to"));
    }
    if to > from {
        let buckets = (bucket_start(to - 1, interval_ms) - bucket_start(from, interval_ms)) / interval_ms + 1;
        if buckets > MAX_CHART_BUCKETS {
            return Err(ApiError::bad_request(format!(
                "window spans {} buckets, at most {} allowed",
                buckets, MAX_CHART_BUCKETS
            )));
        }
    }
    Ok((from, to))
}

pub async fn chart(
    State(state): State<AppState>,
    Path((a, b)): Path<(String, String)>,
    Query(query): Query<ChartQuery>,
) -> ApiResult<Json<ChartResponse>> {
    let (base, quote) = canonical_pair(&address(&a, "token")?, &address(&b, "token")?);
    let interval: ChartInterval = query
        .interval
        .as_deref()
        .unwrap_or("1h")
        .parse()
        .map_err(|e| {
            warn!("Rejected chart request: {}", e);
            ApiError::bad_request("interval must be one of 1m, 5m, 15m, 1h, 4h, 1d")
        })?;
    let (from, to) = chart_window(interval, query.from, query.to, agora_db::now_ms())?;

    let (b2, q2) = (base.clone(), quote.clone());
    let points = run_db(&state, move |db| db.pair_price_points(&b2, &q2, from, to)).await?;
    let candles = build_candles(&points, interval.as_millis())
        .iter()
        .map(convert::candle)
        .collect();

    Ok(Json(ChartResponse {
        base,
        quote,
        interval,
        from: convert::datetime(from),
        to: convert::datetime(to),
        candles,
    }))
}

pub async fn token_price(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<TokenPriceResponse>> {
    let token = address(&token, "token")?;
    let row = run_db(&state, move |db| db.get_token_price(&token))
        .await?
        .ok_or_else(|| ApiError::not_found("no price recorded for token"))?;
    Ok(Json(convert::token_price(row)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000;

    #[test]
    fn test_default_window_is_last_day() {
        let now = 100 * DAY_MS;
        assert_eq!(chart_window(ChartInterval::OneHour, None, None, now).unwrap(), (now - DAY_MS, now));
    }

    #[test]
    fn test_default_window_capped_for_fine_intervals() {
        let now = 100 * DAY_MS + 12_345;
        let (from, to) = chart_window(ChartInterval::OneMinute, None, None, now).unwrap();
        assert_eq!(to - from, 999 * 60_000);
    }

    #[test]
    fn test_window_rules() {
        assert!(chart_window(ChartInterval::OneHour, Some(10), Some(5), 0).is_err());
        assert!(chart_window(ChartInterval::OneHour, Some(0), Some(1000 * HOUR), 0).is_ok());
        assert!(chart_window(ChartInterval::OneHour, Some(0), Some(1001 * HOUR), 0).is_err());
        // An unaligned start touches one extra bucket
        assert!(chart_window(ChartInterval::OneHour, Some(1), Some(1000 * HOUR + 1), 0).is_err());
        assert_eq!(chart_window(ChartInterval::OneDay, Some(7), Some(7), 0).unwrap(), (7, 7));
    }

    #[test]
    fn test_extreme_timestamps_rejected() {
        let err = chart_window(ChartInterval::OneHour, Some(i64::MIN), Some(i64::MAX), 0).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(chart_window(ChartInterval::OneHour, None, Some(i64::MIN), 0).is_err());
        assert!(chart_window(ChartInterval::OneMinute, Some(i64::MIN), None, 0).is_err());
        // Earliest representable instant still resolves a default window
        let earliest = DateTime::<Utc>::MIN_UTC.timestamp_millis();
        assert!(chart_window(ChartInterval::OneDay, None, Some(earliest), 0).is_ok());
    }
}
