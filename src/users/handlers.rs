use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, patch, put},
    Json, Router,
};
use tracing::{error, info, instrument};

use super::dto::{LeaderboardQuery, MeResponse, PushTokenRequest, UpdatePreferencesRequest};
use super::repo::{self, LeaderboardRow, UserProfile};
use crate::auth::AuthUser;
use crate::state::AppState;

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/preferences", patch(update_preferences))
        .route("/me/push-token", put(set_push_token))
}

pub fn leaderboard_routes() -> Router<AppState> {
    Router::new().route("/leaderboard", get(leaderboard))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<MeResponse>, (StatusCode, String)> {
    let user = UserProfile::find_by_id(&state.db, user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            error!(%user_id, "profile missing for valid token");
            (StatusCode::UNAUTHORIZED, "User not found".to_string())
        })?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_preferences(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdatePreferencesRequest>,
) -> Result<Json<MeResponse>, (StatusCode, String)> {
    if let Some(name) = payload.display_name.as_deref() {
        if name.trim().is_empty() {
            return Err((StatusCode::BAD_REQUEST, "Display name is empty".into()));
        }
    }

    let user = UserProfile::update_preferences(
        &state.db,
        user_id,
        payload.display_name.as_deref().map(str::trim),
        payload.notify_status_updates,
        payload.notify_nearby,
    )
    .await
    .map_err(internal)?
    .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    info!(%user_id, "preferences updated");
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn set_push_token(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<PushTokenRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    repo::UserProfile::set_push_token(&state.db, user_id, payload.push_token.as_deref())
        .await
        .map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(q): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardRow>>, (StatusCode, String)> {
    let limit = q.limit.clamp(1, 100);
    let rows = repo::leaderboard(&state.db, limit).await.map_err(internal)?;
    Ok(Json(rows))
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
