use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use agora_db::models::ConversationRow;
use agora_db::queries::LeaveOutcome;
use agora_types::api::{Claims, ConversationResponse, CreateConversationRequest, UnreadResponse};
use agora_types::validate::clamp_limit;

use crate::error::{ApiError, ApiResult};
use crate::{AppState, PageQuery, convert, run_db};

const MAX_PARTICIPANTS: usize = 50;

/// Loads a conversation the caller takes part in.
pub(crate) async fn participant_conversation(
    state: &AppState,
    conversation_id: Uuid,
    user_id: Uuid,
) -> ApiResult<ConversationRow> {
    let cid = conversation_id.to_string();
    let uid = user_id.to_string();
    let row = run_db(state, move |db| db.get_conversation(&cid, &uid))
        .await?
        .ok_or_else(|| ApiError::not_found("conversation not found"))?;

    if !row.participants.contains(&user_id.to_string()) {
        return Err(ApiError::forbidden("not a participant of this conversation"));
    }
    Ok(row)
}

pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut participants: Vec<String> = req.participant_ids.iter().map(Uuid::to_string).collect();
    participants.push(claims.sub.to_string());
    participants.sort_unstable();
    participants.dedup();

    if participants.len() < 2 {
        return Err(ApiError::bad_request("a conversation needs at least two participants"));
    }
    if participants.len() > MAX_PARTICIPANTS {
        return Err(ApiError::bad_request(format!(
            "a conversation has at most {} participants",
            MAX_PARTICIPANTS
        )));
    }

    let id = Uuid::new_v4().to_string();
    let viewer = claims.sub.to_string();
    let now = agora_db::now_ms();
    let (row, created) = run_db(&state, move |db| {
        db.find_or_create_conversation(&id, &participants, &viewer, now)
    })
    .await?;

    if created {
        info!(
            "{} created conversation {} with {} participants",
            claims.username,
            row.id,
            row.participants.len()
        );
    }

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(convert::conversation(row))))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<ConversationResponse>>> {
    let uid = claims.sub.to_string();
    let limit = clamp_limit(page.limit);
    let rows = run_db(&state, move |db| db.list_conversations(&uid, limit, page.offset)).await?;
    Ok(Json(rows.into_iter().map(convert::conversation).collect()))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ConversationResponse>> {
    let row = participant_conversation(&state, conversation_id, claims.sub).await?;
    Ok(Json(convert::conversation(row)))
}

pub async fn unread_total(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UnreadResponse>> {
    let uid = claims.sub.to_string();
    let unread = run_db(&state, move |db| db.unread_total(&uid)).await?;
    Ok(Json(UnreadResponse { unread }))
}

/// Removes the caller from the conversation.
pub async fn leave_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    participant_conversation(&state, conversation_id, claims.sub).await?;

    let cid = conversation_id.to_string();
    let uid = claims.sub.to_string();
    match run_db(&state, move |db| db.leave_conversation(&cid, &uid)).await? {
        LeaveOutcome::NotParticipant => Err(ApiError::forbidden("not a participant of this conversation")),
        LeaveOutcome::Left => Ok(StatusCode::NO_CONTENT),
        LeaveOutcome::Deleted => {
            info!("Conversation {} deleted after its last participant left", conversation_id);
            Ok(StatusCode::NO_CONTENT)
        }
    }
}
