use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub name: Option<String>,
    pub photo: Option<String>,
    pub user_type: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for UserRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            photo: row.try_get("photo")?,
            user_type: row.try_get("user_type")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

pub async fn get_user(pool: &DbPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, name, photo, user_type, created_at FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn create_user(
    pool: &DbPool,
    id: i64,
    name: Option<&str>,
    photo: Option<&str>,
    user_type: &str,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (id, name, photo, user_type, created_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, name, photo, user_type, created_at",
    )
    .bind(id)
    .bind(name)
    .bind(photo)
    .bind(user_type)
    .bind(datetime_to_db_text(Utc::now()))
    .fetch_one(pool)
    .await?;
    Ok(row)
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
    async fn create_and_get_user() {
        let pool = test_pool().await;
        let created = create_user(&pool, 10, Some("Ada"), Some("ada.png"), "broker")
            .await
            .unwrap();
        assert_eq!(created.id, 10);
        assert_eq!(created.user_type, "broker");

        let fetched = get_user(&pool, 10).await.unwrap().unwrap();
        assert_eq!(fetched.name.as_deref(), Some("Ada"));
        assert_eq!(fetched.photo.as_deref(), Some("ada.png"));
    }

    #[tokio::test]
    async fn missing_user_is_none() {
        let pool = test_pool().await;
        assert!(get_user(&pool, 404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn profile_fields_may_be_absent() {
        let pool = test_pool().await;
        let created = create_user(&pool, 11, None, None, "user").await.unwrap();
        assert!(created.name.is_none());
        assert!(created.photo.is_none());
    }
}
