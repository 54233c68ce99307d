use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct CommissionRow {
    pub id: i64,
    pub listing_id: i64,
    pub broker_id: Option<i64>,
    pub client_id: Option<i64>,
    pub client_payment_status: String,
    pub owner_payment_status: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for CommissionRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        let updated_at_raw: String = row.try_get("updated_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            listing_id: row.try_get("listing_id")?,
            broker_id: row.try_get("broker_id")?,
            client_id: row.try_get("client_id")?,
            client_payment_status: row.try_get("client_payment_status")?,
            owner_payment_status: row.try_get("owner_payment_status")?,
            status: row.try_get("status")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
            updated_at: datetime_from_db_text(&updated_at_raw)?,
        })
    }
}

const COMMISSION_COLUMNS: &str = "id, listing_id, broker_id, client_id, client_payment_status, \
     owner_payment_status, status, created_at, updated_at";

/// Most recent commission for a listing; the moderation gate reads this.
pub async fn get_commission_for_listing(
    pool: &DbPool,
    listing_id: i64,
) -> Result<Option<CommissionRow>, DbError> {
    let sql = format!(
        "SELECT {COMMISSION_COLUMNS} FROM commissions
         WHERE listing_id = $1 ORDER BY id DESC LIMIT 1"
    );
    let row = sqlx::query_as::<_, CommissionRow>(&sql)
        .bind(listing_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Commission tying a listing to a specific broker (NULL-safe on broker),
/// used by the client-assignment guard.
pub async fn get_commission_for_listing_and_broker(
    pool: &DbPool,
    listing_id: i64,
    broker_id: Option<i64>,
) -> Result<Option<CommissionRow>, DbError> {
    let sql = format!(
        "SELECT {COMMISSION_COLUMNS} FROM commissions
         WHERE listing_id = $1
           AND (broker_id = $2 OR ($2 IS NULL AND broker_id IS NULL))
         ORDER BY id DESC LIMIT 1"
    );
    let row = sqlx::query_as::<_, CommissionRow>(&sql)
        .bind(listing_id)
        .bind(broker_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

#[allow(clippy::too_many_arguments)]
pub async fn create_commission(
    pool: &DbPool,
    id: i64,
    listing_id: i64,
    broker_id: Option<i64>,
    client_id: Option<i64>,
    client_payment_status: &str,
    owner_payment_status: &str,
    status: &str,
) -> Result<CommissionRow, DbError> {
    let now = datetime_to_db_text(Utc::now());
    let sql = format!(
        "INSERT INTO commissions (id, listing_id, broker_id, client_id, client_payment_status,
                                  owner_payment_status, status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
         RETURNING {COMMISSION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CommissionRow>(&sql)
        .bind(id)
        .bind(listing_id)
        .bind(broker_id)
        .bind(client_id)
        .bind(client_payment_status)
        .bind(owner_payment_status)
        .bind(status)
        .bind(now)
        .fetch_one(pool)
        .await?;
    Ok(row)
}
