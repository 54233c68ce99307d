use thiserror::Error;

/// Errors surfaced to a connection as an `error` event. None of these close
/// the socket or reach other participants.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Unauthenticated(String),
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("database error: {0}")]
    Database(#[from] parley_db::DbError),
}

impl ChatError {
    pub fn register_first() -> Self {
        Self::Unauthenticated("Please register first".to_string())
    }
}
