use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use agora_db::models::ChannelRow;
use agora_types::api::{
    ChannelMessageResponse, ChannelResponse, Claims, CreateChannelRequest, PostChannelMessageRequest,
};
use agora_types::events::GatewayEvent;
use agora_types::models::ChannelKind;
use agora_types::validate::{clamp_limit, message_content};

use crate::error::{ApiError, ApiResult};
use crate::middleware::require_admin;
use crate::{AppState, HistoryQuery, convert, run_db};

pub const MAX_CHANNEL_MESSAGE_CHARS: usize = 2000;
const MAX_DESCRIPTION_CHARS: usize = 500;

async fn load_channel(state: &AppState, channel_id: Uuid, viewer: Uuid) -> ApiResult<ChannelRow> {
    let cid = channel_id.to_string();
    let uid = viewer.to_string();
    run_db(state, move |db| db.get_channel(&cid, &uid))
        .await?
        .ok_or_else(|| ApiError::not_found("channel not found"))
}

fn kind_of(row: &ChannelRow) -> ChannelKind {
    row.kind.parse().unwrap_or_default()
}

pub async fn list_channels(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ChannelResponse>>> {
    let uid = claims.sub.to_string();
    let rows = run_db(&state, move |db| db.list_channels(&uid)).await?;
    Ok(Json(rows.into_iter().map(convert::channel).collect()))
}

pub async fn create_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateChannelRequest>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&claims)?;

    let name = req.name.trim().to_string();
    let name_len = name.chars().count();
    if !(2..=64).contains(&name_len) {
        return Err(ApiError::bad_request("channel name must be 2 to 64 characters"));
    }
    let description = req.description.trim().to_string();
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(ApiError::bad_request("channel description is too long"));
    }

    let channel_id = Uuid::new_v4();
    let cid = channel_id.to_string();
    let creator = claims.sub.to_string();
    let kind = req.kind;
    let now = agora_db::now_ms();
    let row = run_db(&state, move |db| {
        db.create_channel(&cid, &name, &description, kind.as_str(), &creator, now)
    })
    .await?
    .ok_or_else(|| ApiError::conflict("a channel with this name already exists"))?;

    info!("{} created {} channel '{}'", claims.username, kind, row.name);
    state.dispatcher.broadcast(GatewayEvent::ChannelCreate {
        channel_id,
        name: row.name.clone(),
        kind,
    });

    Ok((StatusCode::CREATED, Json(convert::channel(row))))
}

async fn set_membership(state: &AppState, channel_id: Uuid, user_id: Uuid, join: bool) -> ApiResult<ChannelRow> {
    let channel = load_channel(state, channel_id, user_id).await?;
    if kind_of(&channel) == ChannelKind::Announcement {
        return Err(ApiError::bad_request("announcement channels have no membership"));
    }

    let cid = channel_id.to_string();
    let uid = user_id.to_string();
    let now = agora_db::now_ms();
    run_db(state, move |db| {
        if join {
            db.join_channel(&cid, &uid, now)?;
        } else {
            db.leave_channel(&cid, &uid)?;
        }
        db.get_channel(&cid, &uid)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("channel not found"))
}

pub async fn join_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ChannelResponse>> {
    let row = set_membership(&state, channel_id, claims.sub, true).await?;
    Ok(Json(convert::channel(row)))
}

pub async fn leave_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ChannelResponse>> {
    let row = set_membership(&state, channel_id, claims.sub, false).await?;
    Ok(Json(convert::channel(row)))
}

pub async fn post_message(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostChannelMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let content = message_content(&req.content, MAX_CHANNEL_MESSAGE_CHARS).map_err(ApiError::bad_request)?;
    let channel = load_channel(&state, channel_id, claims.sub).await?;

    match kind_of(&channel) {
        ChannelKind::Group if !channel.is_member => {
            return Err(ApiError::forbidden("join the channel to post"));
        }
        ChannelKind::Announcement if !claims.is_admin() => {
            return Err(ApiError::forbidden("only admins post announcements"));
        }
        _ => {}
    }

    let message_id = Uuid::new_v4();
    let mid = message_id.to_string();
    let cid = channel_id.to_string();
    let author_id = claims.sub.to_string();
    let author_username = claims.username.clone();
    let now = agora_db::now_ms();
    let body = content.clone();
    run_db(&state, move |db| {
        db.insert_channel_message(&mid, &cid, &author_id, &author_username, &body, now)
    })
    .await?;

    let timestamp = convert::datetime(now);
    state.dispatcher.broadcast(GatewayEvent::ChannelMessageCreate {
        id: message_id,
        channel_id,
        author_id: claims.sub,
        author_username: claims.username.clone(),
        content: content.clone(),
        timestamp,
    });

    Ok((
        StatusCode::CREATED,
        Json(ChannelMessageResponse {
            id: message_id,
            channel_id,
            author_id: claims.sub,
            author_username: claims.username,
            content,
            created_at: timestamp,
        }),
    ))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ChannelMessageResponse>>> {
    let channel = load_channel(&state, channel_id, claims.sub).await?;
    if kind_of(&channel) == ChannelKind::Group && !channel.is_member {
        return Err(ApiError::forbidden("join the channel to read it"));
    }

    let cid = channel_id.to_string();
    let limit = clamp_limit(query.limit);
    let rows = run_db(&state, move |db| db.get_channel_messages(&cid, limit, query.before)).await?;
    Ok(Json(rows.into_iter().map(convert::channel_message).collect()))
}
