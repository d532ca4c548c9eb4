use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Link an uploaded object to an issue inside the issue's transaction.
pub async fn insert_photo_tx(
    tx: &mut Transaction<'_, Postgres>,
    photo_id: Uuid,
    issue_id: Uuid,
    s3_key: &str,
    content_type: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO issue_photos (id, issue_id, s3_key, content_type)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(photo_id)
    .bind(issue_id)
    .bind(s3_key)
    .bind(content_type)
    .execute(&mut **tx)
    .await
    .context("insert issue photo")?;

    Ok(())
}

/// All photo IDs and keys for an issue, oldest first.
pub async fn list_by_issue(db: &PgPool, issue_id: Uuid) -> anyhow::Result<Vec<(Uuid, String)>> {
    let rows: Vec<(Uuid, String)> = sqlx::query_as::<_, (Uuid, String)>(
        r#"
        SELECT id, s3_key
          FROM issue_photos
         WHERE issue_id = $1
         ORDER BY created_at ASC
        "#,
    )
    .bind(issue_id)
    .fetch_all(db)
    .await
    .context("list photos by issue")?;

    Ok(rows)
}

/// The first photo of an issue, if any.
pub async fn first_by_issue(db: &PgPool, issue_id: Uuid) -> anyhow::Result<Option<(Uuid, String)>> {
    let row = sqlx::query_as::<_, (Uuid, String)>(
        r#"
        SELECT id, s3_key
          FROM issue_photos
         WHERE issue_id = $1
         ORDER BY created_at ASC
         LIMIT 1
        "#,
    )
    .bind(issue_id)
    .fetch_optional(db)
    .await
    .context("get first photo by issue")?;

    Ok(row)
}
