use crate::error::ChatError;
use parley_db::{rooms as db_rooms, DbPool};
use parley_models::room::{canonical_participants, participants_key};
use parley_models::Room;

/// Outcome of room resolution: the room plus whether it pre-existed.
#[derive(Debug, Clone)]
pub struct ResolvedRoom {
    pub room: Room,
    pub already_exists: bool,
}

/// Find-or-create a chat room. With an explicit id this is a plain lookup;
/// with a participant set it finds the room whose set is exactly equal
/// (order-independent) or creates one. A creation race that loses on the
/// participants-key unique index re-fetches and returns the winner's room.
pub async fn resolve(
    pool: &DbPool,
    room_id: Option<i64>,
    participant_ids: Option<&[i64]>,
    id_source: impl Fn() -> i64,
) -> Result<ResolvedRoom, ChatError> {
    if let Some(room_id) = room_id {
        let row = db_rooms::get_room(pool, room_id)
            .await?
            .ok_or(ChatError::NotFound)?;
        let room = assemble_room(pool, row).await?;
        return Ok(ResolvedRoom {
            room,
            already_exists: true,
        });
    }

    let Some(participant_ids) = participant_ids.filter(|ids| !ids.is_empty()) else {
        return Err(ChatError::InvalidInput(
            "roomId or participants required".to_string(),
        ));
    };

    let canonical = canonical_participants(participant_ids);
    let key = participants_key(&canonical);

    if let Some(existing) = db_rooms::find_plain_room_by_key(pool, &key).await? {
        let room = assemble_room(pool, existing).await?;
        return Ok(ResolvedRoom {
            room,
            already_exists: true,
        });
    }

    match db_rooms::create_room(pool, id_source(), None, &canonical, None, None).await {
        Ok(row) => {
            let room = assemble_room(pool, row).await?;
            Ok(ResolvedRoom {
                room,
                already_exists: false,
            })
        }
        Err(err) if err.is_unique_violation() => {
            // Lost the creation race; the winner's row is committed by now.
            tracing::debug!(key = %key, "room creation race lost, re-fetching winner");
            let row = db_rooms::find_plain_room_by_key(pool, &key)
                .await?
                .ok_or(ChatError::NotFound)?;
            let room = assemble_room(pool, row).await?;
            Ok(ResolvedRoom {
                room,
                already_exists: true,
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Explicit read-then-assemble: fetch participant rows and build the plain
/// data model, keeping persistence-library chaining out of the core.
pub async fn assemble_room(pool: &DbPool, row: db_rooms::RoomRow) -> Result<Room, ChatError> {
    let participant_ids = db_rooms::get_room_participant_ids(pool, row.id).await?;
    Ok(Room {
        id: row.id,
        name: row.name,
        participant_ids,
        listing_id: row.listing_id,
        created_by: row.created_by,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
