use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{Issue, IssueCategory, IssuePriority, IssueStatus};

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct IssueListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub status: Option<IssueStatus>,
    pub category: Option<IssueCategory>,
    /// Only the caller's own reports; requires authentication.
    #[serde(default)]
    pub mine: bool,
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    #[serde(default = "default_radius_m")]
    pub radius_m: f64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}
fn default_radius_m() -> f64 {
    1_000.0
}

#[derive(Debug, Deserialize)]
pub struct CreateIssueBase64 {
    pub title: String,
    pub description: String,
    pub category: Option<IssueCategory>,
    pub lat: f64,
    pub lng: f64,
    pub address: Option<String>,
    pub client_ref: Option<Uuid>,
    #[serde(default)]
    pub images_b64: Vec<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedIssueResponse {
    pub id: Uuid,
    pub reported_at: OffsetDateTime,
    pub photo_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct IssueListItem {
    pub id: Uuid,
    pub title: String,
    pub category: IssueCategory,
    pub status: IssueStatus,
    pub priority: IssuePriority,
    pub lat: f64,
    pub lng: f64,
    pub address: Option<String>,
    pub upvote_count: i32,
    pub reported_at: OffsetDateTime,
    /// Only present on the nearby view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

impl IssueListItem {
    pub fn from_issue(i: Issue) -> Self {
        Self {
            id: i.id,
            title: i.title,
            category: i.category,
            status: i.status,
            priority: i.priority,
            lat: i.lat,
            lng: i.lng,
            address: i.address,
            upvote_count: i.upvote_count,
            reported_at: i.reported_at,
            distance_m: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IssueDetails {
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
    pub reported_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub resolved_at: Option<OffsetDateTime>,
    /// Presigned URLs, oldest photo first.
    pub photos: Vec<String>,
    /// `None` for anonymous callers.
    pub upvoted_by_me: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UpvoteResponse {
    pub upvoted: bool,
    pub upvote_count: i32,
}

#[derive(Debug, Deserialize)]
pub struct AdminUpdateRequest {
    pub status: Option<IssueStatus>,
    pub priority: Option<IssuePriority>,
    pub assigned_department: Option<String>,
    pub admin_notes: Option<String>,
    pub public_visible: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults() {
        let p: Pagination = serde_json::from_str("{}").unwrap();
        assert_eq!(p.limit, 20);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn list_query_parses_filters() {
        let q: IssueListQuery =
            serde_json::from_str(r#"{"status":"open","category":"pothole","mine":true}"#).unwrap();
        assert_eq!(q.status, Some(IssueStatus::Open));
        assert_eq!(q.category, Some(IssueCategory::Pothole));
        assert!(q.mine);
    }

    #[test]
    fn nearby_query_defaults_radius() {
        let q: NearbyQuery = serde_json::from_str(r#"{"lat":52.5,"lng":13.4}"#).unwrap();
        assert_eq!(q.radius_m, 1_000.0);
        assert_eq!(q.limit, 20);
    }

    #[test]
    fn list_item_omits_distance_when_absent() {
        let now = OffsetDateTime::now_utc();
        let item = IssueListItem {
            id: Uuid::new_v4(),
            title: "t".into(),
            category: IssueCategory::Other,
            status: IssueStatus::Open,
            priority: IssuePriority::Medium,
            lat: 0.0,
            lng: 0.0,
            address: None,
            upvote_count: 0,
            reported_at: now,
            distance_m: None,
        };
        let json = serde_json::to_string(&item).unwrap();
        assert!(!json.contains("distance_m"));
    }
}
