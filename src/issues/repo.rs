use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::issues::geo::BoundingBox;
use crate::users;

pub const REPORT_POINTS: i32 = 10;
pub const RESOLVE_POINTS: i32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "issue_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "issue_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IssuePriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "issue_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Pothole,
    Garbage,
    WaterLeak,
    Streetlight,
    Drainage,
    Vandalism,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Issue {
    pub id: Uuid,
    pub reporter_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: IssueCategory,
    pub status: IssueStatus,
    pub priority: IssuePriority,
    pub lat: f64,
    pub lng: f64,
    pub address: Option<String>,
    pub admin_notes: Option<String>,
    pub assigned_department: Option<String>,
    pub upvote_count: i32,
    pub sentiment_score: Option<f64>,
    #[serde(skip_serializing)]
    pub triage: Option<serde_json::Value>,
    pub public_visible: bool,
    #[serde(skip_serializing)]
    pub client_ref: Option<Uuid>,
    pub reported_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub resolved_at: Option<OffsetDateTime>,
}

const ISSUE_COLUMNS: &str = r#"
    id, reporter_id, title, description, category, status, priority, lat, lng,
    address, admin_notes, assigned_department, upvote_count, sentiment_score,
    triage, public_visible, client_ref, reported_at, updated_at, resolved_at
"#;

pub struct NewIssue<'a> {
    pub reporter_id: Uuid,
    pub title: &'a str,
    pub description: &'a str,
    pub category: IssueCategory,
    pub lat: f64,
    pub lng: f64,
    pub address: Option<&'a str>,
    pub client_ref: Option<Uuid>,
}

/// Inserts inside the caller's transaction. Returns `None` when the
/// (reporter, client_ref) pair already exists, i.e. a replayed offline submit.
pub async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    issue_id: Uuid,
    new: &NewIssue<'_>,
) -> anyhow::Result<Option<Issue>> {
    let issue = sqlx::query_as::<_, Issue>(&format!(
        r#"
        INSERT INTO issues (id, reporter_id, title, description, category, lat, lng, address, client_ref)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (reporter_id, client_ref) WHERE client_ref IS NOT NULL DO NOTHING
        RETURNING {ISSUE_COLUMNS}
        "#
    ))
    .bind(issue_id)
    .bind(new.reporter_id)
    .bind(new.title)
    .bind(new.description)
    .bind(&new.category)
    .bind(new.lat)
    .bind(new.lng)
    .bind(new.address)
    .bind(new.client_ref)
    .fetch_optional(&mut **tx)
    .await
    .context("insert issue")?;
    Ok(issue)
}

pub async fn find_by_client_ref(
    db: &PgPool,
    reporter_id: Uuid,
    client_ref: Uuid,
) -> anyhow::Result<Option<Issue>> {
    let issue = sqlx::query_as::<_, Issue>(&format!(
        "SELECT {ISSUE_COLUMNS} FROM issues WHERE reporter_id = $1 AND client_ref = $2"
    ))
    .bind(reporter_id)
    .bind(client_ref)
    .fetch_optional(db)
    .await?;
    Ok(issue)
}

pub async fn get(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Issue>> {
    let issue =
        sqlx::query_as::<_, Issue>(&format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await?;
    Ok(issue)
}

#[derive(Debug, Default)]
pub struct IssueFilter {
    pub status: Option<IssueStatus>,
    pub category: Option<IssueCategory>,
    pub reporter_id: Option<Uuid>,
    pub include_hidden: bool,
    pub limit: i64,
    pub offset: i64,
}

pub async fn list(db: &PgPool, f: &IssueFilter) -> anyhow::Result<Vec<Issue>> {
    let rows = sqlx::query_as::<_, Issue>(&format!(
        r#"
        SELECT {ISSUE_COLUMNS}
          FROM issues
         WHERE (public_visible OR $1)
           AND ($2::issue_status IS NULL OR status = $2)
           AND ($3::issue_category IS NULL OR category = $3)
           AND ($4::uuid IS NULL OR reporter_id = $4)
         ORDER BY reported_at DESC
         LIMIT $5 OFFSET $6
        "#
    ))
    .bind(f.include_hidden)
    .bind(f.status)
    .bind(&f.category)
    .bind(f.reporter_id)
    .bind(f.limit)
    .bind(f.offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Bounding-box prefilter for the nearby view; exact distance is applied by
/// the caller.
pub async fn list_in_bbox(db: &PgPool, bbox: &BoundingBox, limit: i64) -> anyhow::Result<Vec<Issue>> {
    let rows = sqlx::query_as::<_, Issue>(&format!(
        r#"
        SELECT {ISSUE_COLUMNS}
          FROM issues
         WHERE public_visible
           AND lat BETWEEN $1 AND $2
           AND lng BETWEEN $3 AND $4
         ORDER BY reported_at DESC
         LIMIT $5
        "#
    ))
    .bind(bbox.min_lat)
    .bind(bbox.max_lat)
    .bind(bbox.min_lng)
    .bind(bbox.max_lng)
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// An upvote insert can race issue deletion; the foreign key reports it.
fn is_missing_issue(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::ForeignKeyViolation)
}

/// Atomic upvote toggle: membership in `issue_upvotes` and the denormalized
/// counter move in one transaction. Returns `None` for an unknown issue.
pub async fn toggle_upvote(
    db: &PgPool,
    issue_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<Option<(bool, i32)>> {
    let mut tx = db.begin().await.context("begin upvote tx")?;

    let found: Option<i32> = sqlx::query_scalar(r#"SELECT 1 FROM issues WHERE id = $1"#)
        .bind(issue_id)
        .fetch_optional(&mut *tx)
        .await
        .context("check issue")?;
    if found.is_none() {
        tx.rollback().await.ok();
        return Ok(None);
    }

    let removed = sqlx::query(
        r#"DELETE FROM issue_upvotes WHERE issue_id = $1 AND user_id = $2"#,
    )
    .bind(issue_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .context("delete upvote")?
    .rows_affected();

    let (upvoted, delta) = if removed == 0 {
        let inserted = sqlx::query(r#"INSERT INTO issue_upvotes (issue_id, user_id) VALUES ($1, $2)"#)
            .bind(issue_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await;
        if let Err(e) = inserted {
            if is_missing_issue(&e) {
                tx.rollback().await.ok();
                return Ok(None);
            }
            return Err(e).context("insert upvote");
        }
        (true, 1i32)
    } else {
        (false, -1i32)
    };

    let count: Option<i32> = sqlx::query_scalar(
        r#"
        UPDATE issues
           SET upvote_count = upvote_count + $2,
               updated_at = now()
         WHERE id = $1
        RETURNING upvote_count
        "#,
    )
    .bind(issue_id)
    .bind(delta)
    .fetch_optional(&mut *tx)
    .await
    .context("bump upvote count")?;

    let Some(count) = count else {
        // Issue deleted after the check; treat as unknown.
        tx.rollback().await.ok();
        return Ok(None);
    };

    tx.commit().await.context("commit upvote tx")?;
    Ok(Some((upvoted, count)))
}

pub async fn has_upvoted(db: &PgPool, issue_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let found: Option<i32> = sqlx::query_scalar(
        r#"SELECT 1 FROM issue_upvotes WHERE issue_id = $1 AND user_id = $2"#,
    )
    .bind(issue_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(found.is_some())
}

pub struct AdminPatch<'a> {
    pub status: Option<IssueStatus>,
    pub priority: Option<IssuePriority>,
    pub assigned_department: Option<&'a str>,
    pub admin_notes: Option<&'a str>,
    pub public_visible: Option<bool>,
}

/// Applies an admin patch in one transaction. A transition onto `resolved`
/// stamps `resolved_at` and awards the reporter exactly once. Returns the
/// updated issue and the previous status.
pub async fn admin_update(
    db: &PgPool,
    issue_id: Uuid,
    patch: &AdminPatch<'_>,
) -> anyhow::Result<Option<(Issue, IssueStatus)>> {
    let mut tx = db.begin().await.context("begin admin tx")?;

    let before = sqlx::query_as::<_, Issue>(&format!(
        "SELECT {ISSUE_COLUMNS} FROM issues WHERE id = $1 FOR UPDATE"
    ))
    .bind(issue_id)
    .fetch_optional(&mut *tx)
    .await
    .context("lock issue")?;

    let Some(before) = before else {
        tx.rollback().await.ok();
        return Ok(None);
    };

    let newly_resolved = patch.status == Some(IssueStatus::Resolved)
        && before.status != IssueStatus::Resolved;

    let after = sqlx::query_as::<_, Issue>(&format!(
        r#"
        UPDATE issues
           SET status = COALESCE($2, status),
               priority = COALESCE($3, priority),
               assigned_department = COALESCE($4, assigned_department),
               admin_notes = COALESCE($5, admin_notes),
               public_visible = COALESCE($6, public_visible),
               resolved_at = CASE WHEN $7 THEN now() ELSE resolved_at END,
               updated_at = now()
         WHERE id = $1
        RETURNING {ISSUE_COLUMNS}
        "#
    ))
    .bind(issue_id)
    .bind(patch.status)
    .bind(patch.priority)
    .bind(patch.assigned_department)
    .bind(patch.admin_notes)
    .bind(patch.public_visible)
    .bind(newly_resolved)
    .fetch_one(&mut *tx)
    .await
    .context("update issue")?;

    if newly_resolved {
        users::repo::award_resolve_tx(&mut tx, before.reporter_id, RESOLVE_POINTS).await?;
    }

    tx.commit().await.context("commit admin tx")?;
    Ok(Some((after, before.status)))
}

/// Triage write-back. `category` is only set when the classifier is allowed
/// to override (reporter picked `other`).
pub async fn apply_triage(
    db: &PgPool,
    issue_id: Uuid,
    category: Option<&IssueCategory>,
    priority: &IssuePriority,
    sentiment_score: f64,
    raw: &serde_json::Value,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE issues
           SET category = COALESCE($2, category),
               priority = $3,
               sentiment_score = $4,
               triage = $5,
               updated_at = now()
         WHERE id = $1
        "#,
    )
    .bind(issue_id)
    .bind(category)
    .bind(priority)
    .bind(sentiment_score)
    .bind(raw)
    .execute(db)
    .await
    .context("apply triage")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_category_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&IssueStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&IssueCategory::WaterLeak).unwrap(),
            "\"water_leak\""
        );
        assert_eq!(
            serde_json::to_string(&IssuePriority::Critical).unwrap(),
            "\"critical\""
        );
    }

    #[test]
    fn category_parses_from_query_strings() {
        let c: IssueCategory = serde_json::from_str("\"water_leak\"").unwrap();
        assert_eq!(c, IssueCategory::WaterLeak);
        assert!(serde_json::from_str::<IssueCategory>("\"WaterLeak\"").is_err());
    }

    #[test]
    fn fk_violation_reads_as_missing_issue() {
        #[derive(Debug)]
        struct FkErr;
        impl std::fmt::Display for FkErr {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "violates foreign key constraint")
            }
        }
        impl std::error::Error for FkErr {}
        impl sqlx::error::DatabaseError for FkErr {
            fn message(&self) -> &str {
                "violates foreign key constraint"
            }
            fn kind(&self) -> sqlx::error::ErrorKind {
                sqlx::error::ErrorKind::ForeignKeyViolation
            }
            fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
                self
            }
            fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
                self
            }
            fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
                self
            }
        }

        assert!(is_missing_issue(&sqlx::Error::Database(Box::new(FkErr))));
        assert!(!is_missing_issue(&sqlx::Error::RowNotFound));
    }
}
