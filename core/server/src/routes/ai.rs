use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use journal_schemas::{
    AnswerRequest, AnswerResponse, ClarifyingQuestion, DailySummaryResponse,
    EntryAnalysisResponse, EntryId, QuestionId, QuestionStatus,
};
use serde::Deserialize;

use super::{today, OptionalDateQuery};
use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiQuery};
use crate::AppState;

/// Both spellings of each endpoint are served
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ai/analyze-entry/:id", post(analyze_entry))
        .route("/ai/analyze/:id", post(analyze_entry))
        .route("/ai/daily-summary", get(daily_summary))
        .route("/ai/summary", get(daily_summary))
        .route("/ai/clarifying-questions", get(clarifying_questions))
        .route("/ai/questions", get(list_questions))
        .route("/ai/answer-question/:id", post(answer_question))
        .route("/ai/questions/:id/answer", post(answer_question))
        .route("/ai/questions/:id/dismiss", post(dismiss_question))
}

async fn analyze_entry(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<EntryAnalysisResponse>> {
    let response = state.analyzer.analyze_entry(&user, &EntryId(id)).await?;
    Ok(Json(response))
}

async fn daily_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<OptionalDateQuery>,
) -> ApiResult<Json<DailySummaryResponse>> {
    let date = query.date.unwrap_or_else(today);
    let response = state.analyzer.daily_summary(&user, date).await?;
    Ok(Json(response))
}

async fn clarifying_questions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<ClarifyingQuestion>>> {
    Ok(Json(state.analyzer.clarifying_questions(&user).await?))
}

#[derive(Debug, Default, Deserialize)]
struct QuestionQuery {
    status: Option<String>,
}

/// Without `?status=` this is the generating endpoint; with it, a plain listing
async fn list_questions(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<QuestionQuery>,
) -> ApiResult<Json<Vec<ClarifyingQuestion>>> {
    let Some(raw) = query.status else {
        return clarifying_questions(State(state), user).await;
    };

    let status = QuestionStatus::parse(&raw).ok_or_else(|| {
        ApiError::Validation(format!(
            "Unknown status '{}' (expected pending, answered or dismissed)",
            raw
        ))
    })?;

    let db = state.db.lock().await;
    Ok(Json(db.list_questions(&user.0, Some(status))?))
}

async fn answer_question(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<AnswerRequest>,
) -> ApiResult<Json<AnswerResponse>> {
    let answer = request.answer.trim();
    if answer.is_empty() {
        return Err(ApiError::Validation("answer must not be empty".to_string()));
    }

    let response = state
        .analyzer
        .answer_question(&user, &QuestionId(id), answer)
        .await?;
    Ok(Json(response))
}

async fn dismiss_question(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ClarifyingQuestion>> {
    let question = state.analyzer.dismiss_question(&user, &QuestionId(id)).await?;
    Ok(Json(question))
}
