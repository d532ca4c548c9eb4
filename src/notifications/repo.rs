use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    pub read: bool,
    pub created_at: OffsetDateTime,
    pub read_at: Option<OffsetDateTime>,
}

pub async fn insert(
    db: &PgPool,
    user_id: Uuid,
    title: &str,
    body: &str,
    data: &serde_json::Value,
) -> anyhow::Result<Notification> {
    let n = sqlx::query_as::<_, Notification>(
        r#"
        INSERT INTO notifications (user_id, title, body, data)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, title, body, data, read, created_at, read_at
        "#,
    )
    .bind(user_id)
    .bind(title)
    .bind(body)
    .bind(data)
    .fetch_one(db)
    .await
    .context("insert notification")?;
    Ok(n)
}

pub async fn list_by_user(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<Notification>> {
    let rows = sqlx::query_as::<_, Notification>(
        r#"
        SELECT id, user_id, title, body, data, read, created_at, read_at
          FROM notifications
         WHERE user_id = $1
         ORDER BY created_at DESC
         LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn unread_count(db: &PgPool, user_id: Uuid) -> anyhow::Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT read"#,
    )
    .bind(user_id)
    .fetch_one(db)
    .await?;
    Ok(count)
}

/// Marks one of the caller's notifications read. Idempotent: re-reading keeps
/// the original read_at. Returns false when the row isn't theirs.
pub async fn mark_read(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
    let rows = sqlx::query(
        r#"
        UPDATE notifications
           SET read = TRUE,
               read_at = COALESCE(read_at, now())
         WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(db)
    .await?
    .rows_affected();
    Ok(rows > 0)
}
