use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::repo::{UserProfile, UserRole};

/// Full profile view returned to its owner.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub role: UserRole,
    pub points: i32,
    pub issues_reported: i32,
    pub issues_resolved: i32,
    pub notify_status_updates: bool,
    pub notify_nearby: bool,
    pub created_at: OffsetDateTime,
}

impl From<UserProfile> for MeResponse {
    fn from(u: UserProfile) -> Self {
        Self {
            id: u.id,
            email: u.email,
            display_name: u.display_name,
            photo_url: u.photo_url,
            role: u.role,
            points: u.points,
            issues_reported: u.issues_reported,
            issues_resolved: u.issues_resolved,
            notify_status_updates: u.notify_status_updates,
            notify_nearby: u.notify_nearby,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePreferencesRequest {
    pub display_name: Option<String>,
    pub notify_status_updates: Option<bool>,
    pub notify_nearby: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PushTokenRequest {
    /// `null` clears the stored token (sign-out).
    pub push_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default = "default_leaderboard_limit")]
    pub limit: i64,
}

fn default_leaderboard_limit() -> i64 {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn me_response_hides_nothing_it_should_show() {
        let now = OffsetDateTime::now_utc();
        let me = MeResponse {
            id: Uuid::new_v4(),
            email: "citizen@example.com".into(),
            display_name: "citizen".into(),
            photo_url: None,
            role: UserRole::Citizen,
            points: 30,
            issues_reported: 3,
            issues_resolved: 1,
            notify_status_updates: true,
            notify_nearby: false,
            created_at: now,
        };
        let json = serde_json::to_string(&me).unwrap();
        assert!(json.contains("citizen@example.com"));
        assert!(json.contains("\"points\":30"));
        assert!(json.contains("\"role\":\"citizen\""));
    }

    #[test]
    fn leaderboard_limit_defaults() {
        let q: LeaderboardQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.limit, 20);
    }
}
