use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub room_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for MessageRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            room_id: row.try_get("room_id")?,
            sender_id: row.try_get("sender_id")?,
            content: row.try_get("content")?,
            status: row.try_get("status")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, room_id, sender_id, content, status, created_at";

pub async fn create_message(
    pool: &DbPool,
    id: i64,
    room_id: i64,
    sender_id: i64,
    content: &str,
    status: &str,
) -> Result<MessageRow, DbError> {
    let sql = format!(
        "INSERT INTO messages (id, room_id, sender_id, content, status, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {MESSAGE_COLUMNS}"
    );
    let row = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(id)
        .bind(room_id)
        .bind(sender_id)
        .bind(content)
        .bind(status)
        .bind(datetime_to_db_text(Utc::now()))
        .fetch_one(pool)
        .await?;

    // Bump room activity for ordering; ignore failures.
    let _ = crate::rooms::touch_room(pool, room_id).await;

    Ok(row)
}

pub async fn get_message(pool: &DbPool, id: i64) -> Result<Option<MessageRow>, DbError> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
    let row = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Upgrade a freshly persisted message from "sent" to "delivered". The status
/// guard in the WHERE clause keeps the transition monotone: a message that
/// has already moved on is left untouched.
pub async fn mark_message_delivered(pool: &DbPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("UPDATE messages SET status = 'delivered' WHERE id = $1 AND status = 'sent'")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Set-based read transition for everything the reader did not send. Returns
/// the number of messages that changed; already-read rows never regress.
pub async fn mark_room_messages_read(
    pool: &DbPool,
    room_id: i64,
    reader_id: i64,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE messages SET status = 'read'
         WHERE room_id = $1 AND sender_id != $2 AND status != 'read'",
    )
    .bind(room_id)
    .bind(reader_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Windowed history query, newest first.
pub async fn get_room_messages(
    pool: &DbPool,
    room_id: i64,
    before: Option<i64>,
    limit: i64,
) -> Result<Vec<MessageRow>, DbError> {
    let rows = match before {
        Some(before_id) => {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE room_id = $1 AND id < $2 ORDER BY id DESC LIMIT $3"
            );
            sqlx::query_as::<_, MessageRow>(&sql)
                .bind(room_id)
                .bind(before_id)
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE room_id = $1 ORDER BY id DESC LIMIT $2"
            );
            sqlx::query_as::<_, MessageRow>(&sql)
                .bind(room_id)
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}
