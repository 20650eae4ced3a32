use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use journal_schemas::UserId;

use crate::error::ApiError;

/// Header set by the session layer in front of this service
pub const USER_HEADER: &str = "x-user-id";

/// The caller's identity. Every handler that touches user data takes one.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Missing X-User-Id header".to_string()))?;

        Ok(CurrentUser(UserId(user.to_string())))
    }
}
