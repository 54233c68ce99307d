use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Internal(err) => {
                tracing::error!("API internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message, "message": message }))).into_response()
    }
}

impl From<parley_core::error::ChatError> for ApiError {
    fn from(e: parley_core::error::ChatError) -> Self {
        use parley_core::error::ChatError;
        match e {
            ChatError::NotFound => ApiError::NotFound,
            ChatError::Unauthenticated(_) => ApiError::Unauthorized,
            ChatError::Forbidden(_) => ApiError::Forbidden,
            ChatError::EmptyMessage => ApiError::BadRequest("Message cannot be empty".into()),
            ChatError::InvalidInput(msg) => ApiError::BadRequest(msg),
            ChatError::Database(_) => ApiError::Internal(anyhow::anyhow!("database error")),
        }
    }
}

impl From<parley_db::DbError> for ApiError {
    fn from(e: parley_db::DbError) -> Self {
        match e {
            parley_db::DbError::NotFound => ApiError::NotFound,
            parley_db::DbError::Sqlx(_) => ApiError::Internal(anyhow::anyhow!("database error")),
        }
    }
}
