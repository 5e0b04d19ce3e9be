use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use agora_db::queries::{JoinOutcome, QuestChanges, QuestEditOutcome, TaskOutcome, TransitionOutcome};
use agora_types::api::{
    AddTaskRequest, Claims, CreateQuestRequest, QuestProgressResponse, QuestResponse,
    QuestTransitionRequest, UpdateQuestRequest,
};
use agora_types::events::GatewayEvent;
use agora_types::models::QuestStatus;
use agora_types::validate::MAX_POINTS;

use crate::error::{ApiError, ApiResult};
use crate::middleware::require_admin;
use crate::{AppState, convert, run_db};

fn quest_title(raw: &str) -> ApiResult<String> {
    let title = raw.trim();
    if !(3..=120).contains(&title.chars().count()) {
        return Err(ApiError::bad_request("quest title must be 3 to 120 characters"));
    }
    Ok(title.to_string())
}

fn point_value(value: i64, field: &str) -> ApiResult<i64> {
    if !(0..=MAX_POINTS).contains(&value) {
        return Err(ApiError::bad_request(format!(
            "{} must be between 0 and {}",
            field, MAX_POINTS
        )));
    }
    Ok(value)
}

fn edit_result(outcome: QuestEditOutcome) -> ApiResult<QuestResponse> {
    match outcome {
        QuestEditOutcome::NotFound => Err(ApiError::not_found("quest not found")),
        QuestEditOutcome::NotDraft { current } => Err(ApiError::conflict(format!(
            "quest is {}; only draft quests can be edited",
            current
        ))),
        QuestEditOutcome::InvalidWindow => Err(ApiError::bad_request("end_at must be after start_at")),
        QuestEditOutcome::Updated(row) => Ok(convert::quest(row)),
    }
}

#[derive(Debug, Deserialize)]
pub struct QuestListQuery {
    pub status: Option<QuestStatus>,
}

pub async fn list_quests(
    State(state): State<AppState>,
    Query(query): Query<QuestListQuery>,
) -> ApiResult<Json<Vec<QuestResponse>>> {
    let rows = run_db(&state, move |db| db.list_quests(query.status)).await?;
    Ok(Json(rows.into_iter().map(convert::quest).collect()))
}

pub async fn get_quest(
    State(state): State<AppState>,
    Path(quest_id): Path<Uuid>,
) -> ApiResult<Json<QuestResponse>> {
    let qid = quest_id.to_string();
    let row = run_db(&state, move |db| db.get_quest(&qid))
        .await?
        .ok_or_else(|| ApiError::not_found("quest not found"))?;
    Ok(Json(convert::quest(row)))
}

pub async fn create_quest(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateQuestRequest>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&claims)?;

    let title = quest_title(&req.title)?;
    let reward = point_value(req.reward_points, "reward_points")?;
    let start_at = req.start_at.timestamp_millis();
    let end_at = req.end_at.timestamp_millis();
    if end_at <= start_at {
        return Err(ApiError::bad_request("end_at must be after start_at"));
    }

    let id = Uuid::new_v4().to_string();
    let creator = claims.sub.to_string();
    let description = req.description.trim().to_string();
    let now = agora_db::now_ms();
    let row = run_db(&state, move |db| {
        db.create_quest(&id, &title, &description, reward, start_at, end_at, &creator, now)
    })
    .await?;

    info!("{} created quest '{}' ({})", claims.username, row.title, row.id);
    Ok((StatusCode::CREATED, Json(convert::quest(row))))
}

pub async fn update_quest(
    State(state): State<AppState>,
    Path(quest_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateQuestRequest>,
) -> ApiResult<Json<QuestResponse>> {
    require_admin(&claims)?;

    let changes = QuestChanges {
        title: req.title.as_deref().map(quest_title).transpose()?,
        description: req.description.map(|d| d.trim().to_string()),
        reward_points: req
            .reward_points
            .map(|r| point_value(r, "reward_points"))
            .transpose()?,
        start_at: req.start_at.map(|t| t.timestamp_millis()),
        end_at: req.end_at.map(|t| t.timestamp_millis()),
    };

    let qid = quest_id.to_string();
    let now = agora_db::now_ms();
    let outcome = run_db(&state, move |db| db.update_quest(&qid, &changes, now)).await?;
    Ok(Json(edit_result(outcome)?))
}

pub async fn add_task(
    State(state): State<AppState>,
    Path(quest_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&claims)?;

    let title = req.title.trim().to_string();
    if !(1..=120).contains(&title.chars().count()) {
        return Err(ApiError::bad_request("task title must be 1 to 120 characters"));
    }
    let kind = req.kind.trim().to_ascii_lowercase();
    if kind.is_empty() || kind.len() > 32 {
        return Err(ApiError::bad_request("task kind must be 1 to 32 characters"));
    }
    let points = point_value(req.points, "points")?;

    let qid = quest_id.to_string();
    let task_id = Uuid::new_v4().to_string();
    let now = agora_db::now_ms();
    let outcome = run_db(&state, move |db| {
        db.add_quest_task(&qid, &task_id, &title, &kind, points, now)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(edit_result(outcome)?)))
}

pub async fn transition(
    State(state): State<AppState>,
    Path(quest_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<QuestTransitionRequest>,
) -> ApiResult<Json<QuestResponse>> {
    require_admin(&claims)?;

    let qid = quest_id.to_string();
    let next = req.status;
    let now = agora_db::now_ms();
    let row = match run_db(&state, move |db| db.transition_quest(&qid, next, now)).await? {
        TransitionOutcome::NotFound => return Err(ApiError::not_found("quest not found")),
        TransitionOutcome::Invalid { current } => {
            return Err(ApiError::conflict(format!("quest cannot move from {} to {}", current, next)));
        }
        TransitionOutcome::NoTasks => {
            return Err(ApiError::conflict("a quest needs at least one task to go active"));
        }
        TransitionOutcome::Expired => {
            return Err(ApiError::conflict("quest end time has already passed"));
        }
        TransitionOutcome::Updated(row) => row,
    };

    info!("{} moved quest {} to {}", claims.username, quest_id, next);
    state.dispatcher.broadcast(GatewayEvent::QuestStatusChanged {
        quest_id,
        status: next,
    });
    Ok(Json(convert::quest(row)))
}

pub async fn join_quest(
    State(state): State<AppState>,
    Path(quest_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let qid = quest_id.to_string();
    let uid = claims.sub.to_string();
    let now = agora_db::now_ms();
    let (outcome, total_tasks) = run_db(&state, move |db| {
        let outcome = db.join_quest(&qid, &uid, now)?;
        let total = db.get_quest(&qid)?.map_or(0, |q| q.tasks.len() as u64);
        Ok((outcome, total))
    })
    .await?;

    match outcome {
        JoinOutcome::NotFound => Err(ApiError::not_found("quest not found")),
        JoinOutcome::NotActive => Err(ApiError::conflict("quest is not active")),
        JoinOutcome::OutsideWindow => Err(ApiError::conflict("quest is not running right now")),
        JoinOutcome::Joined { progress, newly } => {
            let status = if newly { StatusCode::CREATED } else { StatusCode::OK };
            Ok((status, Json(convert::progress(progress, total_tasks))))
        }
    }
}

pub async fn complete_task(
    State(state): State<AppState>,
    Path((quest_id, task_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<QuestProgressResponse>> {
    let qid = quest_id.to_string();
    let tid = task_id.to_string();
    let uid = claims.sub.to_string();
    let now = agora_db::now_ms();
    let (outcome, total_tasks) = run_db(&state, move |db| {
        let outcome = db.complete_quest_task(&qid, &tid, &uid, now)?;
        let total = db.get_quest(&qid)?.map_or(0, |q| q.tasks.len() as u64);
        Ok((outcome, total))
    })
    .await?;

    let progress = match outcome {
        TaskOutcome::QuestNotFound => return Err(ApiError::not_found("quest not found")),
        TaskOutcome::TaskNotFound => return Err(ApiError::not_found("task not found in this quest")),
        TaskOutcome::NotActive => return Err(ApiError::conflict("quest is not active")),
        TaskOutcome::NotParticipant => return Err(ApiError::forbidden("join the quest first")),
        TaskOutcome::AlreadyCompleted(progress) => progress,
        TaskOutcome::Completed {
            progress,
            points_awarded,
            quest_completed,
        } => {
            info!(
                "{} completed task {} of quest {} (+{} points{})",
                claims.username,
                task_id,
                quest_id,
                points_awarded,
                if quest_completed { ", quest finished" } else { "" }
            );
            progress
        }
    };

    Ok(Json(convert::progress(progress, total_tasks)))
}

pub async fn get_progress(
    State(state): State<AppState>,
    Path(quest_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<QuestProgressResponse>> {
    let qid = quest_id.to_string();
    let uid = claims.sub.to_string();
    let (progress, total_tasks) = run_db(&state, move |db| {
        let total = db.get_quest(&qid)?.map(|q| q.tasks.len() as u64);
        let progress = db.get_quest_participant(&qid, &uid)?;
        Ok((progress, total))
    })
    .await?;

    let total_tasks = total_tasks.ok_or_else(|| ApiError::not_found("quest not found"))?;
    let progress = progress.ok_or_else(|| ApiError::not_found("not participating in this quest"))?;
    Ok(Json(convert::progress(progress, total_tasks)))
}

pub async fn list_participants(
    State(state): State<AppState>,
    Path(quest_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<QuestProgressResponse>>> {
    require_admin(&claims)?;

    let qid = quest_id.to_string();
    let (rows, total_tasks) = run_db(&state, move |db| {
        let Some(quest) = db.get_quest(&qid)? else {
            return Ok((Vec::new(), None));
        };
        let rows = db.list_quest_participants(&qid)?;
        Ok((rows, Some(quest.tasks.len() as u64)))
    })
    .await?;

    let total_tasks = total_tasks.ok_or_else(|| ApiError::not_found("quest not found"))?;
    Ok(Json(
        rows.into_iter()
            .map(|row| convert::progress(row, total_tasks))
            .collect(),
    ))
}
