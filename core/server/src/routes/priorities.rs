use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use journal_schemas::{
    CreatePriorityRequest, Priority, PriorityId, RankRequest, UpdatePriorityRequest,
    MAX_PRIORITY_RANK,
};
use journal_storage::NewPriority;

use super::{today, DateQuery, OptionalDateQuery};
use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiQuery};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/priorities", get(list_priorities).post(create_priority))
        .route("/priorities/by-date", get(priorities_by_date))
        .route(
            "/priorities/:id",
            get(get_priority).put(update_priority).delete(delete_priority),
        )
        .route("/priorities/:id/toggle", patch(toggle_priority))
        .route("/priorities/:id/rank", patch(set_rank))
}

async fn list_priorities(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<OptionalDateQuery>,
) -> ApiResult<Json<Vec<Priority>>> {
    let db = state.db.lock().await;
    Ok(Json(db.list_priorities(&user, query.date)?))
}

async fn priorities_by_date(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<DateQuery>,
) -> ApiResult<Json<Vec<Priority>>> {
    let db = state.db.lock().await;
    Ok(Json(db.list_priorities(&user, Some(query.date))?))
}

async fn create_priority(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(request): ApiJson<CreatePriorityRequest>,
) -> ApiResult<(StatusCode, Json<Priority>)> {
    let content = request.content.trim();
    if content.is_empty() {
        return Err(ApiError::Validation("content must not be empty".to_string()));
    }
    validate_rank(request.rank)?;

    let date = request.date.unwrap_or_else(today);
    let db = state.db.lock().await;

    if let Some(ref entry_id) = request.journal_entry_id {
        if db.get_entry(&user, entry_id)?.is_none() {
            return Err(ApiError::NotFound(format!("Journal entry {} not found", entry_id)));
        }
    }

    let rank = match request.rank {
        Some(rank) => rank,
        None => db.next_priority_rank(&user, date)?,
    };

    let priority = db.create_priority(
        &user,
        &NewPriority {
            content,
            rank,
            date,
            journal_entry_id: request.journal_entry_id.as_ref(),
        },
    )?;

    Ok((StatusCode::CREATED, Json(priority)))
}

async fn get_priority(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Priority>> {
    let id = PriorityId(id);
    let db = state.db.lock().await;

    db.get_priority(&user, &id)?
        .map(Json)
        .ok_or_else(|| priority_not_found(&id))
}

async fn update_priority(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ApiJson(mut request): ApiJson<UpdatePriorityRequest>,
) -> ApiResult<Json<Priority>> {
    if let Some(content) = request.content.take() {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(ApiError::Validation("content must not be empty".to_string()));
        }
        request.content = Some(trimmed.to_string());
    }
    validate_rank(request.rank)?;

    let id = PriorityId(id);
    let db = state.db.lock().await;

    db.update_priority(&user, &id, &request)?
        .map(Json)
        .ok_or_else(|| priority_not_found(&id))
}

async fn toggle_priority(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Priority>> {
    let id = PriorityId(id);
    let db = state.db.lock().await;

    db.toggle_priority(&user, &id)?
        .map(Json)
        .ok_or_else(|| priority_not_found(&id))
}

async fn set_rank(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<RankRequest>,
) -> ApiResult<Json<Priority>> {
    validate_rank(Some(request.rank))?;

    let id = PriorityId(id);
    let db = state.db.lock().await;

    db.set_priority_rank(&user, &id, request.rank)?
        .map(Json)
        .ok_or_else(|| priority_not_found(&id))
}

async fn delete_priority(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = PriorityId(id);
    let db = state.db.lock().await;

    if db.delete_priority(&user, &id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(priority_not_found(&id))
    }
}

fn validate_rank(rank: Option<u32>) -> ApiResult<()> {
    match rank {
        Some(0) => Err(ApiError::Validation("rank must be a positive integer".to_string())),
        Some(rank) if rank > MAX_PRIORITY_RANK => Err(ApiError::Validation(format!(
            "rank must not exceed {}",
            MAX_PRIORITY_RANK
        ))),
        _ => Ok(()),
    }
}

fn priority_not_found(id: &PriorityId) -> ApiError {
    ApiError::NotFound(format!("Priority {} not found", id))
}
