use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Citizen,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub role: UserRole,
    pub points: i32,
    pub issues_reported: i32,
    pub issues_resolved: i32,
    pub notify_status_updates: bool,
    pub notify_nearby: bool,
    #[serde(skip_serializing)]
    pub push_token: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const PROFILE_COLUMNS: &str = r#"
    id, email, password_hash, display_name, photo_url, role, points,
    issues_reported, issues_resolved, notify_status_updates, notify_nearby,
    push_token, created_at, updated_at
"#;

impl UserProfile {
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<UserProfile>> {
        let user = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<UserProfile>> {
        let user = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn create(
        db: &PgPool,
        email: &str,
        password_hash: &str,
        display_name: &str,
    ) -> anyhow::Result<UserProfile> {
        let user = sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            INSERT INTO users (email, password_hash, display_name)
            VALUES ($1, $2, $3)
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(password_hash)
        .bind(display_name)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Partial update: absent fields keep their current value.
    pub async fn update_preferences(
        db: &PgPool,
        id: Uuid,
        display_name: Option<&str>,
        notify_status_updates: Option<bool>,
        notify_nearby: Option<bool>,
    ) -> anyhow::Result<Option<UserProfile>> {
        let user = sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            UPDATE users
               SET display_name = COALESCE($2, display_name),
                   notify_status_updates = COALESCE($3, notify_status_updates),
                   notify_nearby = COALESCE($4, notify_nearby),
                   updated_at = now()
             WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(display_name)
        .bind(notify_status_updates)
        .bind(notify_nearby)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn set_push_token(db: &PgPool, id: Uuid, token: Option<&str>) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET push_token = $2, updated_at = now() WHERE id = $1"#)
            .bind(id)
            .bind(token)
            .execute(db)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LeaderboardRow {
    pub id: Uuid,
    pub display_name: String,
    pub points: i32,
    pub issues_reported: i32,
    pub issues_resolved: i32,
}

pub async fn leaderboard(db: &PgPool, limit: i64) -> anyhow::Result<Vec<LeaderboardRow>> {
    let rows = sqlx::query_as::<_, LeaderboardRow>(
        r#"
        SELECT id, display_name, points, issues_reported, issues_resolved
          FROM users
         ORDER BY points DESC, issues_reported DESC, display_name ASC
         LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Reporter earns points when a report lands; runs inside the report's
/// transaction so points never outlive a rolled-back issue.
pub async fn award_report_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    points: i32,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE users
           SET points = points + $2,
               issues_reported = issues_reported + 1,
               updated_at = now()
         WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(points)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Reporter earns a bonus when their issue is resolved; same-transaction rule
/// as `award_report_tx`.
pub async fn award_resolve_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    points: i32,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE users
           SET points = points + $2,
               issues_resolved = issues_resolved + 1,
               updated_at = now()
         WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(points)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
