use axum::{
    extract::{Path, Query, State},
    Json,
};
use parley_core::AppState;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::AuthUser;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Message id to page backwards from (exclusive).
    pub before: Option<String>,
    pub limit: Option<i64>,
}

/// Message history for a room, newest first. Participants only.
pub async fn get_room_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let room_id: i64 = room_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid room id".into()))?;
    let before = query
        .before
        .as_deref()
        .map(|raw| {
            raw.parse::<i64>()
                .map_err(|_| ApiError::BadRequest("Invalid before cursor".into()))
        })
        .transpose()?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    parley_db::rooms::get_room(&state.db, room_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if !parley_db::rooms::is_room_participant(&state.db, room_id, auth.user_id).await? {
        return Err(ApiError::Forbidden);
    }

    let rows = parley_db::messages::get_room_messages(&state.db, room_id, before, limit).await?;
    let result: Vec<Value> = rows
        .iter()
        .map(|m| {
            json!({
                "id": m.id.to_string(),
                "roomId": m.room_id.to_string(),
                "senderId": m.sender_id.to_string(),
                "message": m.content,
                "status": m.status,
                "createdAt": m.created_at.to_rfc3339(),
            })
        })
        .collect();

    Ok(Json(json!(result)))
}
