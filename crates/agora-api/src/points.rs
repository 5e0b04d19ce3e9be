use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use agora_db::queries::{AdjustOutcome, ConversionOutcome, RequestOutcome, Review};
use agora_types::api::{
    AdjustPointsRequest, BalanceResponse, Claims, CompleteConversionRequest, ConversionResponse,
    ConversionSettings, ConversionStatsEntry, RejectConversionRequest, RequestConversionRequest,
    UpdateSettingsRequest,
};
use agora_types::events::GatewayEvent;
use agora_types::models::ConversionStatus;
use agora_types::validate::{MAX_POINTS, clamp_limit, is_evm_address, is_tx_hash, normalize_address};

use crate::error::{ApiError, ApiResult};
use crate::middleware::require_admin;
use crate::{AppState, convert, run_db};

const MAX_REASON_CHARS: usize = 500;

fn reason(raw: &str) -> ApiResult<String> {
    let reason = raw.trim();
    if reason.is_empty() {
        return Err(ApiError::bad_request("reason is required"));
    }
    if reason.chars().count() > MAX_REASON_CHARS {
        return Err(ApiError::bad_request("reason is too long"));
    }
    Ok(reason.to_string())
}

pub async fn get_balance(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<BalanceResponse>> {
    let uid = claims.sub.to_string();
    let row = run_db(&state, move |db| db.get_points_account(&uid)).await?;
    Ok(Json(convert::balance(claims.sub, row)))
}

pub async fn adjust_points(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AdjustPointsRequest>,
) -> ApiResult<Json<BalanceResponse>> {
    require_admin(&claims)?;
    if req.delta == 0 {
        return Err(ApiError::bad_request("delta must not be zero"));
    }
    if req.delta.unsigned_abs() > MAX_POINTS.unsigned_abs() {
        return Err(ApiError::bad_request(format!("delta must be between -{0} and {0}", MAX_POINTS)));
    }
    let reason = format!("admin:{}:{}", claims.sub, reason(&req.reason)?);

    let uid = req.user_id.to_string();
    let now = agora_db::now_ms();
    match run_db(&state, move |db| db.adjust_points(&uid, req.delta, &reason, now)).await? {
        AdjustOutcome::InsufficientBalance { balance } => Err(ApiError::bad_request(format!(
            "balance of {} cannot absorb {}",
            balance, req.delta
        ))),
        AdjustOutcome::Overflow { balance } => Err(ApiError::bad_request(format!(
            "balance of {} cannot take {} more",
            balance, req.delta
        ))),
        AdjustOutcome::Adjusted(row) => {
            info!("{} adjusted points of {} by {}", claims.username, req.user_id, req.delta);
            Ok(Json(convert::balance(req.user_id, Some(row))))
        }
    }
}

// -- Conversions --

pub async fn list_my_conversions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ConversionResponse>>> {
    let uid = claims.sub.to_string();
    let rows = run_db(&state, move |db| db.list_conversions_for_user(&uid)).await?;
    Ok(Json(rows.into_iter().map(convert::conversion).collect()))
}

pub async fn request_conversion(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RequestConversionRequest>,
) -> ApiResult<impl IntoResponse> {
    let wallet = normalize_address(&req.wallet_address);
    if !is_evm_address(&wallet) {
        return Err(ApiError::bad_request("wallet_address is not a valid address"));
    }
    if req.points <= 0 {
        return Err(ApiError::bad_request("points must be positive"));
    }

    let id = Uuid::new_v4().to_string();
    let uid = claims.sub.to_string();
    let points = req.points;
    let now = agora_db::now_ms();
    match run_db(&state, move |db| db.request_conversion(&id, &uid, points, &wallet, now)).await? {
        RequestOutcome::Disabled => Err(ApiError::conflict("points conversion is currently disabled")),
        RequestOutcome::BelowMinimum { min_points } => Err(ApiError::bad_request(format!(
            "at least {} points are required per conversion",
            min_points
        ))),
        RequestOutcome::InsufficientBalance { balance } => Err(ApiError::bad_request(format!(
            "insufficient balance: {} available",
            balance
        ))),
        RequestOutcome::Created(row) => {
            info!("{} requested conversion {} of {} points", claims.username, row.id, row.points);
            Ok((StatusCode::CREATED, Json(convert::conversion(row))))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConversionListQuery {
    pub status: Option<ConversionStatus>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

pub async fn list_conversions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ConversionListQuery>,
) -> ApiResult<Json<Vec<ConversionResponse>>> {
    require_admin(&claims)?;
    let limit = clamp_limit(query.limit);
    let rows = run_db(&state, move |db| db.list_conversions(query.status, limit, query.offset)).await?;
    Ok(Json(rows.into_iter().map(convert::conversion).collect()))
}

/// One entry per status, zero when no conversion has it.
pub async fn conversion_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ConversionStatsEntry>>> {
    require_admin(&claims)?;
    let rows = run_db(&state, |db| db.conversion_stats()).await?;

    let stats = ConversionStatus::all()
        .iter()
        .map(|status| {
            let (count, points) = rows
                .iter()
                .find(|(s, _, _)| s == status.as_str())
                .map_or((0, 0), |(_, count, points)| (*count, *points));
            ConversionStatsEntry {
                status: *status,
                count: u64::try_from(count).unwrap_or_default(),
                points,
            }
        })
        .collect();
    Ok(Json(stats))
}

enum Decision {
    Approve,
    Reject(String),
    Complete(String),
}

async fn review(state: &AppState, claims: &Claims, conversion_id: Uuid, decision: Decision) -> ApiResult<ConversionResponse> {
    require_admin(claims)?;

    let cid = conversion_id.to_string();
    let reviewer = claims.sub.to_string();
    let now = agora_db::now_ms();
    let outcome = run_db(state, move |db| {
        let review = match &decision {
            Decision::Approve => Review::Approve,
            Decision::Reject(reason) => Review::Reject { reason },
            Decision::Complete(tx_hash) => Review::Complete { tx_hash },
        };
        db.review_conversion(&cid, review, &reviewer, now)
    })
    .await?;

    let row = match outcome {
        ConversionOutcome::NotFound => return Err(ApiError::not_found("conversion not found")),
        ConversionOutcome::InvalidTransition { current } => {
            return Err(ApiError::conflict(format!("conversion is already {}", current)));
        }
        ConversionOutcome::Updated(row) => row,
    };

    let response = convert::conversion(row);
    info!("{} marked conversion {} {}", claims.username, conversion_id, response.status);
    state
        .dispatcher
        .send_to_user(response.user_id, GatewayEvent::ConversionUpdated {
            conversion_id,
            status: response.status,
            tx_hash: response.tx_hash.clone(),
            reason: response.reason.clone(),
        })
        .await;
    Ok(response)
}

pub async fn approve_conversion(
    State(state): State<AppState>,
    Path(conversion_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ConversionResponse>> {
    Ok(Json(review(&state, &claims, conversion_id, Decision::Approve).await?))
}

pub async fn reject_conversion(
    State(state): State<AppState>,
    Path(conversion_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RejectConversionRequest>,
) -> ApiResult<Json<ConversionResponse>> {
    let reason = reason(&req.reason)?;
    Ok(Json(review(&state, &claims, conversion_id, Decision::Reject(reason)).await?))
}

pub async fn complete_conversion(
    State(state): State<AppState>,
    Path(conversion_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CompleteConversionRequest>,
) -> ApiResult<Json<ConversionResponse>> {
    let tx_hash = normalize_address(&req.tx_hash);
    if !is_tx_hash(&tx_hash) {
        return Err(ApiError::bad_request("tx_hash is not a valid transaction hash"));
    }
    Ok(Json(review(&state, &claims, conversion_id, Decision::Complete(tx_hash)).await?))
}

// -- Settings --

pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<ConversionSettings>> {
    let settings = run_db(&state, |db| db.get_conversion_settings()).await?;
    Ok(Json(settings))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<ConversionSettings>> {
    require_admin(&claims)?;
    if req.points_per_token.is_some_and(|p| p <= 0) {
        return Err(ApiError::bad_request("points_per_token must be positive"));
    }
    if req.min_points.is_some_and(|m| m < 1) {
        return Err(ApiError::bad_request("min_points must be at least 1"));
    }

    let settings = run_db(&state, move |db| {
        let current = db.get_conversion_settings()?;
        let next = ConversionSettings {
            points_per_token: req.points_per_token.unwrap_or(current.points_per_token),
            min_points: req.min_points.unwrap_or(current.min_points),
            enabled: req.enabled.unwrap_or(current.enabled),
        };
        db.put_conversion_settings(&next)?;
        Ok(next)
    })
    .await?;

    info!(
        "{} updated conversion settings: {} points/token, min {}, enabled {}",
        claims.username, settings.points_per_token, settings.min_points, settings.enabled
    );
    Ok(Json(settings))
}
