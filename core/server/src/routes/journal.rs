use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use journal_schemas::{CreateEntryRequest, EntryId, EntryPage, JournalEntry, UpdateEntryRequest};
use serde::Deserialize;
use tracing::info;

use super::{today, DateQuery};
use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiQuery};
use crate::AppState;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/journal", get(list_entries).post(create_entry))
        .route("/journal/by-date", get(entries_by_date))
        .route(
            "/journal/:id",
            get(get_entry).put(update_entry).delete(delete_entry),
        )
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_entries(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<EntryPage>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    let offset = query.offset.unwrap_or(0);
    if i64::try_from(offset).is_err() {
        return Err(ApiError::Validation(format!("offset must not exceed {}", i64::MAX)));
    }

    let db = state.db.lock().await;
    let entries = db.list_entries(&user, limit, offset)?;
    let total = db.count_entries(&user)?;

    Ok(Json(EntryPage {
        entries,
        total,
        limit,
        offset,
    }))
}

async fn entries_by_date(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<DateQuery>,
) -> ApiResult<Json<Vec<JournalEntry>>> {
    let db = state.db.lock().await;
    Ok(Json(db.list_entries_by_date(&user, query.date)?))
}

async fn create_entry(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(request): ApiJson<CreateEntryRequest>,
) -> ApiResult<(StatusCode, Json<JournalEntry>)> {
    let content = request.content.trim();
    if content.is_empty() {
        return Err(ApiError::Validation("content must not be empty".to_string()));
    }

    let db = state.db.lock().await;
    let entry = db.create_entry(&user, content, request.date.unwrap_or_else(today))?;
    info!("Created journal entry {} for {}", entry.id, user);

    Ok((StatusCode::CREATED, Json(entry)))
}

async fn get_entry(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<JournalEntry>> {
    let id = EntryId(id);
    let db = state.db.lock().await;

    db.get_entry(&user, &id)?
        .map(Json)
        .ok_or_else(|| entry_not_found(&id))
}

async fn update_entry(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateEntryRequest>,
) -> ApiResult<Json<JournalEntry>> {
    let content = request.content.as_deref().map(str::trim);
    if content == Some("") {
        return Err(ApiError::Validation("content must not be empty".to_string()));
    }

    let id = EntryId(id);
    let db = state.db.lock().await;

    db.update_entry(&user, &id, content, request.date)?
        .map(Json)
        .ok_or_else(|| entry_not_found(&id))
}

async fn delete_entry(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = EntryId(id);
    let db = state.db.lock().await;

    if db.delete_entry(&user, &id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(entry_not_found(&id))
    }
}

fn entry_not_found(id: &EntryId) -> ApiError {
    ApiError::NotFound(format!("Journal entry {} not found", id))
}
