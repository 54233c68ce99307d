use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use parley_models::room::participants_key;
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct RoomRow {
    pub id: i64,
    pub name: Option<String>,
    pub participants_key: String,
    pub listing_id: Option<i64>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for RoomRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        let updated_at_raw: String = row.try_get("updated_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            participants_key: row.try_get("participants_key")?,
            listing_id: row.try_get("listing_id")?,
            created_by: row.try_get("created_by")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
            updated_at: datetime_from_db_text(&updated_at_raw)?,
        })
    }
}

const ROOM_COLUMNS: &str =
    "id, name, participants_key, listing_id, created_by, created_at, updated_at";

pub async fn get_room(pool: &DbPool, id: i64) -> Result<Option<RoomRow>, DbError> {
    let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = $1");
    let row = sqlx::query_as::<_, RoomRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Plain (non-listing) room with exactly this canonical participant set.
pub async fn find_plain_room_by_key(
    pool: &DbPool,
    key: &str,
) -> Result<Option<RoomRow>, DbError> {
    let sql =
        format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE participants_key = $1 AND listing_id IS NULL");
    let row = sqlx::query_as::<_, RoomRow>(&sql)
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Listing-scoped room created by this user for this listing.
pub async fn find_listing_room(
    pool: &DbPool,
    listing_id: i64,
    created_by: i64,
) -> Result<Option<RoomRow>, DbError> {
    let sql =
        format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE listing_id = $1 AND created_by = $2");
    let row = sqlx::query_as::<_, RoomRow>(&sql)
        .bind(listing_id)
        .bind(created_by)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Insert the room row and its participant rows in one transaction. A
/// unique-index violation (concurrent creation of the same room) surfaces to
/// the caller, which re-fetches the winner's row instead of erroring.
pub async fn create_room(
    pool: &DbPool,
    id: i64,
    name: Option<&str>,
    participant_ids: &[i64],
    listing_id: Option<i64>,
    created_by: Option<i64>,
) -> Result<RoomRow, DbError> {
    let key = participants_key(participant_ids);
    let now = datetime_to_db_text(Utc::now());

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO rooms (id, name, participants_key, listing_id, created_by, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $6)",
    )
    .bind(id)
    .bind(name)
    .bind(&key)
    .bind(listing_id)
    .bind(created_by)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    for user_id in parley_models::room::canonical_participants(participant_ids) {
        sqlx::query("INSERT INTO room_participants (room_id, user_id) VALUES ($1, $2)")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = $1");
    let row = sqlx::query_as::<_, RoomRow>(&sql)
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(row)
}

pub async fn get_room_participant_ids(pool: &DbPool, room_id: i64) -> Result<Vec<i64>, DbError> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT user_id FROM room_participants WHERE room_id = $1 ORDER BY user_id",
    )
    .bind(room_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn is_room_participant(
    pool: &DbPool,
    room_id: i64,
    user_id: i64,
) -> Result<bool, DbError> {
    let exists: Option<(i32,)> = sqlx::query_as(
        "SELECT 1 FROM room_participants WHERE room_id = $1 AND user_id = $2 LIMIT 1",
    )
    .bind(room_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(exists.is_some())
}

/// Rooms a user participates in, most recently active first.
pub async fn list_user_rooms(pool: &DbPool, user_id: i64) -> Result<Vec<RoomRow>, DbError> {
    let rows = sqlx::query_as::<_, RoomRow>(
        "SELECT r.id, r.name, r.participants_key, r.listing_id, r.created_by,
                r.created_at, r.updated_at
         FROM rooms r
         INNER JOIN room_participants p ON p.room_id = r.id
         WHERE p.user_id = $1
         ORDER BY r.updated_at DESC, r.id DESC",
    )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Bump a room's activity timestamp. Best-effort; callers ignore the result.
pub async fn touch_room(pool: &DbPool, room_id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE rooms SET updated_at = $2 WHERE id = $1")
        .bind(room_id)
        .bind(datetime_to_db_text(Utc::now()))
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> DbPool {
        let pool = crate::create_pool("sqlite::memory:", 1).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn create_room_stores_canonical_participants() {
        let pool = test_pool().await;
        let room = create_room(&pool, 100, None, &[3, 1, 3, 2], None, Some(1))
            .await
            .unwrap();
        assert_eq!(room.participants_key, "1:2:3");

        let ids = get_room_participant_ids(&pool, 100).await.unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(is_room_participant(&pool, 100, 2).await.unwrap());
        assert!(!is_room_participant(&pool, 100, 9).await.unwrap());
    }

    #[tokio::test]
    async fn plain_room_key_is_unique() {
        let pool = test_pool().await;
        create_room(&pool, 101, None, &[1, 2], None, Some(1))
            .await
            .unwrap();
        let err = create_room(&pool, 102, None, &[2, 1], None, Some(2))
            .await
            .expect_err("same participant set must conflict");
        assert!(err.is_unique_violation());

        let winner = find_plain_room_by_key(&pool, "1:2").await.unwrap().unwrap();
        assert_eq!(winner.id, 101);
    }

    #[tokio::test]
    async fn listing_rooms_may_share_participant_sets() {
        let pool = test_pool().await;
        create_room(&pool, 103, Some("Flat"), &[1, 2], Some(50), Some(1))
            .await
            .unwrap();
        // Same pair again, different listing creator context: allowed.
        create_room(&pool, 104, Some("Flat"), &[1, 2], Some(50), Some(2))
            .await
            .unwrap();

        // But the same (listing, creator) key conflicts.
        let err = create_room(&pool, 105, Some("Flat"), &[1, 2, 3], Some(50), Some(1))
            .await
            .expect_err("same listing/creator must conflict");
        assert!(err.is_unique_violation());

        let existing = find_listing_room(&pool, 50, 1).await.unwrap().unwrap();
        assert_eq!(existing.id, 103);
    }

    #[tokio::test]
    async fn user_rooms_are_listed_most_recent_first() {
        let pool = test_pool().await;
        create_room(&pool, 106, None, &[1, 2], None, Some(1))
            .await
            .unwrap();
        create_room(&pool, 107, None, &[1, 3], None, Some(1))
            .await
            .unwrap();
        touch_room(&pool, 106).await.unwrap();

        let rooms = list_user_rooms(&pool, 1).await.unwrap();
        assert_eq!(rooms.len(), 2);
        // Ties on updated_at fall back to id, so the touched room is not last.
        assert!(rooms.iter().any(|r| r.id == 106));

        assert!(list_user_rooms(&pool, 99).await.unwrap().is_empty());
    }
}
