use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use journal_schemas::{ContextEntity, EntityId, EntityType, RelationshipView};
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::ApiQuery;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/context/entities", get(list_entities))
        .route("/context/entities/:id", get(get_entity).delete(delete_entity))
        .route("/context/relationships", get(list_relationships))
}

#[derive(Debug, Default, Deserialize)]
struct EntityQuery {
    #[serde(rename = "type")]
    entity_type: Option<String>,
}

async fn list_entities(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<EntityQuery>,
) -> ApiResult<Json<Vec<ContextEntity>>> {
    let entity_type = match query.entity_type.as_deref() {
        Some(raw) => Some(EntityType::parse(raw).ok_or_else(|| {
            ApiError::Validation(format!(
                "Unknown entity type '{}' (expected person, role, project, product or strategy)",
                raw
            ))
        })?),
        None => None,
    };

    let db = state.db.lock().await;
    Ok(Json(db.list_entities(&user, entity_type)?))
}

async fn get_entity(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ContextEntity>> {
    let id = EntityId(id);
    let db = state.db.lock().await;

    db.get_entity(&user, &id)?
        .map(Json)
        .ok_or_else(|| entity_not_found(&id))
}

async fn delete_entity(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = EntityId(id);
    let db = state.db.lock().await;

    if db.delete_entity(&user, &id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(entity_not_found(&id))
    }
}

async fn list_relationships(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<RelationshipView>>> {
    let db = state.db.lock().await;
    Ok(Json(db.list_relationships(&user)?))
}

fn entity_not_found(id: &EntityId) -> ApiError {
    ApiError::NotFound(format!("Context entity {} not found", id))
}
