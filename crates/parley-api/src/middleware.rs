use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use parley_core::AppState;

/// Identity of the caller, taken from the `X-User-Id` header set by the
/// upstream marketplace after it has authenticated the request. This service
/// never validates credentials itself.
pub struct AuthUser {
    pub user_id: i64,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing X-User-Id header"))?;

        let user_id = raw
            .parse::<i64>()
            .map_err(|_| (StatusCode::UNAUTHORIZED, "Invalid X-User-Id header"))?;

        Ok(AuthUser { user_id })
    }
}
