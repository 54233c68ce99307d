use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct ListingRow {
    pub id: i64,
    pub kind: String,
    pub title: String,
    pub owner_id: i64,
    pub broker_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for ListingRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            title: row.try_get("title")?,
            owner_id: row.try_get("owner_id")?,
            broker_id: row.try_get("broker_id")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

/// Lookup always pairs the id with its kind, so an id queried under the
/// wrong kind does not resolve.
pub async fn get_listing(
    pool: &DbPool,
    id: i64,
    kind: &str,
) -> Result<Option<ListingRow>, DbError> {
    let row = sqlx::query_as::<_, ListingRow>(
        "SELECT id, kind, title, owner_id, broker_id, created_at
         FROM listings WHERE id = $1 AND kind = $2",
    )
    .bind(id)
    .bind(kind)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn create_listing(
    pool: &DbPool,
    id: i64,
    kind: &str,
    title: &str,
    owner_id: i64,
    broker_id: Option<i64>,
) -> Result<ListingRow, DbError> {
    let row = sqlx::query_as::<_, ListingRow>(
        "INSERT INTO listings (id, kind, title, owner_id, broker_id, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id, kind, title, owner_id, broker_id, created_at",
    )
    .bind(id)
    .bind(kind)
    .bind(title)
    .bind(owner_id)
    .bind(broker_id)
    .bind(datetime_to_db_text(Utc::now()))
    .fetch_one(pool)
    .await?;
    Ok(row)
}
