use axum::{extract::State, Json};
use parley_core::AppState;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::AuthUser;

/// Rooms the caller participates in, most recently active first.
pub async fn list_rooms(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let rows = parley_db::rooms::list_user_rooms(&state.db, auth.user_id).await?;

    let mut result = Vec::with_capacity(rows.len());
    for row in rows {
        let room = parley_core::rooms::assemble_room(&state.db, row).await?;
        result.push(json!({
            "id": room.id.to_string(),
            "name": room.name,
            "participants": room
                .participant_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>(),
            "listingId": room.listing_id.map(|id| id.to_string()),
            "createdAt": room.created_at.to_rfc3339(),
            "updatedAt": room.updated_at.to_rfc3339(),
        }));
    }

    Ok(Json(json!(result)))
}
