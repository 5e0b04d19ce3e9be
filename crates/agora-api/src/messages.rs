use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use agora_db::models::DirectMessageRow;
use agora_db::queries::DeleteOutcome;
use agora_types::api::{
    Claims, DirectMessageResponse, EditMessageRequest, MarkReadResponse, SendMessageRequest,
};
use agora_types::events::GatewayEvent;
use agora_types::validate::{clamp_limit, message_content};

use crate::conversations::participant_conversation;
use crate::error::{ApiError, ApiResult};
use crate::{AppState, HistoryQuery, convert, run_db};

pub const MAX_DIRECT_MESSAGE_CHARS: usize = 5000;

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let content = message_content(&req.content, MAX_DIRECT_MESSAGE_CHARS).map_err(ApiError::bad_request)?;
    let conversation = participant_conversation(&state, conversation_id, claims.sub).await?;

    let message_id = Uuid::new_v4();
    let mid = message_id.to_string();
    let cid = conversation_id.to_string();
    let sender_id = claims.sub.to_string();
    let sender_username = claims.username.clone();
    let now = agora_db::now_ms();
    let row = run_db(&state, move |db| {
        db.insert_direct_message(&mid, &cid, &sender_id, &sender_username, &content, now)
    })
    .await?;

    let recipients: Vec<Uuid> = conversation.participants.iter().map(|p| convert::id(p)).collect();
    state
        .dispatcher
        .send_to_users(&recipients, GatewayEvent::DirectMessageCreate {
            id: message_id,
            conversation_id,
            sender_id: claims.sub,
            sender_username: claims.username,
            content: row.content.clone(),
            timestamp: convert::datetime(row.created_at),
        })
        .await;

    Ok((StatusCode::CREATED, Json(convert::direct_message(row))))
}

/// Newest first. `before` pages to strictly older messages.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<DirectMessageResponse>>> {
    participant_conversation(&state, conversation_id, claims.sub).await?;

    let cid = conversation_id.to_string();
    let limit = clamp_limit(query.limit);
    let rows = run_db(&state, move |db| db.get_direct_messages(&cid, limit, query.before)).await?;
    Ok(Json(rows.into_iter().map(convert::direct_message).collect()))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MarkReadResponse>> {
    let conversation = participant_conversation(&state, conversation_id, claims.sub).await?;

    let cid = conversation_id.to_string();
    let uid = claims.sub.to_string();
    let now = agora_db::now_ms();
    let marked = run_db(&state, move |db| db.mark_conversation_read(&cid, &uid, now)).await?;

    if marked > 0 {
        let recipients: Vec<Uuid> = conversation.participants.iter().map(|p| convert::id(p)).collect();
        state
            .dispatcher
            .send_to_users(&recipients, GatewayEvent::DirectMessageRead {
                conversation_id,
                user_id: claims.sub,
                count: marked,
            })
            .await;
    }

    Ok(Json(MarkReadResponse { marked }))
}

/// Loads a live message written by the caller.
async fn own_message(state: &AppState, message_id: Uuid, user_id: Uuid) -> ApiResult<DirectMessageRow> {
    let mid = message_id.to_string();
    let row = run_db(state, move |db| db.get_direct_message(&mid))
        .await?
        .filter(|m| !m.is_deleted)
        .ok_or_else(|| ApiError::not_found("message not found"))?;

    if row.sender_id != user_id.to_string() {
        warn!("User {} tried to modify message {} of {}", user_id, message_id, row.sender_id);
        return Err(ApiError::forbidden("only the sender can modify a message"));
    }
    Ok(row)
}

async fn notify_participants(state: &AppState, conversation_id: &str, event: GatewayEvent) -> ApiResult<()> {
    let cid = conversation_id.to_string();
    let participants = run_db(state, move |db| {
        Ok(db.get_conversation(&cid, "")?.map(|c| c.participants).unwrap_or_default())
    })
    .await?;
    let recipients: Vec<Uuid> = participants.iter().map(|p| convert::id(p)).collect();
    state.dispatcher.send_to_users(&recipients, event).await;
    Ok(())
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> ApiResult<Json<DirectMessageResponse>> {
    let content = message_content(&req.content, MAX_DIRECT_MESSAGE_CHARS).map_err(ApiError::bad_request)?;
    let original = own_message(&state, message_id, claims.sub).await?;

    let mid = message_id.to_string();
    let now = agora_db::now_ms();
    let updated = run_db(&state, move |db| {
        if !db.edit_direct_message(&mid, &content, now)? {
            return Ok(None);
        }
        db.get_direct_message(&mid)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("message not found"))?;

    notify_participants(&state, &original.conversation_id, GatewayEvent::DirectMessageUpdate {
        id: message_id,
        conversation_id: convert::id(&original.conversation_id),
        content: Some(updated.content.clone()),
        deleted: false,
    })
    .await?;

    Ok(Json(convert::direct_message(updated)))
}

/// Soft delete. The message disappears from history and previews.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    own_message(&state, message_id, claims.sub).await?;

    let mid = message_id.to_string();
    match run_db(&state, move |db| db.soft_delete_direct_message(&mid)).await? {
        DeleteOutcome::NotFound => Err(ApiError::not_found("message not found")),
        DeleteOutcome::Deleted { conversation_id } => {
            info!("{} deleted message {}", claims.username, message_id);
            notify_participants(&state, &conversation_id, GatewayEvent::DirectMessageUpdate {
                id: message_id,
                conversation_id: convert::id(&conversation_id),
                content: None,
                deleted: true,
            })
            .await?;
            Ok(StatusCode::NO_CONTENT)
        }
    }
}
