use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::info;

use agora_types::api::{Claims, SetVisibilityRequest, TokenIdsResponse, VisibilityResponse};
use agora_types::validate::{is_evm_address, normalize_address, normalize_token_id};

use crate::error::{ApiError, ApiResult};
use crate::middleware::require_admin;
use crate::{AppState, convert, run_db};

fn contract(raw: &str) -> ApiResult<String> {
    let contract = normalize_address(raw);
    if !is_evm_address(&contract) {
        return Err(ApiError::bad_request("contract is not a valid address"));
    }
    Ok(contract)
}

fn token_id(raw: &str) -> ApiResult<String> {
    normalize_token_id(raw).ok_or_else(|| ApiError::bad_request("token_id must be a decimal number"))
}

#[derive(Debug, Deserialize)]
pub struct ContractQuery {
    pub contract: Option<String>,
}

fn optional_contract(query: ContractQuery) -> ApiResult<Option<String>> {
    query.contract.as_deref().map(contract).transpose()
}

pub async fn list_visibility(
    State(state): State<AppState>,
    Query(query): Query<ContractQuery>,
) -> ApiResult<Json<Vec<VisibilityResponse>>> {
    let contract = optional_contract(query)?;
    let rows = run_db(&state, move |db| db.list_nft_visibility(contract.as_deref())).await?;
    Ok(Json(rows.into_iter().map(convert::visibility).collect()))
}

pub async fn featured_tokens(
    State(state): State<AppState>,
    Query(query): Query<ContractQuery>,
) -> ApiResult<Json<Vec<VisibilityResponse>>> {
    let contract = optional_contract(query)?;
    let rows = run_db(&state, move |db| db.featured_nft_tokens(contract.as_deref())).await?;
    Ok(Json(rows.into_iter().map(convert::visibility).collect()))
}

pub async fn hidden_tokens(
    State(state): State<AppState>,
    Path(raw_contract): Path<String>,
) -> ApiResult<Json<TokenIdsResponse>> {
    let contract = contract(&raw_contract)?;
    let c = contract.clone();
    let token_ids = run_db(&state, move |db| db.hidden_nft_tokens(&c)).await?;
    Ok(Json(TokenIdsResponse {
        contract: Some(contract),
        token_ids,
    }))
}

pub async fn set_visibility(
    State(state): State<AppState>,
    Path((raw_contract, raw_token)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetVisibilityRequest>,
) -> ApiResult<Json<VisibilityResponse>> {
    require_admin(&claims)?;
    let contract = contract(&raw_contract)?;
    let token = token_id(&raw_token)?;

    let admin = claims.sub.to_string();
    let now = agora_db::now_ms();
    let row = run_db(&state, move |db| {
        db.set_nft_visibility(&contract, &token, req.hidden, req.featured, &admin, now)
    })
    .await?;

    info!(
        "{} set {}#{} hidden={} featured={}",
        claims.username, row.contract, row.token_id, row.hidden, row.featured
    );
    Ok(Json(convert::visibility(row)))
}

pub async fn clear_visibility(
    State(state): State<AppState>,
    Path((raw_contract, raw_token)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    require_admin(&claims)?;
    let contract = contract(&raw_contract)?;
    let token = token_id(&raw_token)?;

    if run_db(&state, move |db| db.clear_nft_visibility(&contract, &token)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("no flags stored for this token"))
    }
}
