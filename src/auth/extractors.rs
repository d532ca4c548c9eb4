use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use std::convert::Infallible;
use tracing::warn;
use uuid::Uuid;

use super::claims::{Claims, JwtKeys, TokenKind};
use crate::state::AppState;
use crate::users::repo::UserRole;

/// Extracts and validates a bearer access token, yielding the user ID.
pub struct AuthUser(pub Uuid);

fn bearer_claims<S>(parts: &Parts, state: &S) -> Result<Claims, (StatusCode, String)>
where
    JwtKeys: FromRef<S>,
{
    let keys = JwtKeys::from_ref(state);
    let auth_header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Missing Authorization header".to_string(),
        ))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Invalid Authorization header".to_string(),
        ))?;

    let claims = match keys.verify(token) {
        Ok(c) => c,
        Err(_) => {
            warn!("invalid or expired token");
            return Err((
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token".to_string(),
            ));
        }
    };

    if claims.kind != TokenKind::Access {
        return Err((
            StatusCode::UNAUTHORIZED,
            "Access token required".to_string(),
        ));
    }

    Ok(claims)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        bearer_claims(parts, state).map(|c| AuthUser(c.sub))
    }
}

/// Like `AuthUser` but never rejects: anonymous requests yield `None`.
pub struct OptionalAuthUser(pub Option<Uuid>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuthUser(
            bearer_claims(parts, state).ok().map(|c| c.sub),
        ))
    }
}

/// Valid access token whose user has the admin role. The role lives in the
/// database, not in the token, so a demotion takes effect immediately.
pub struct AdminUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = bearer_claims(parts, state)?;

        let role: Option<UserRole> =
            sqlx::query_scalar(r#"SELECT role FROM users WHERE id = $1"#)
                .bind(claims.sub)
                .fetch_optional(&state.db)
                .await
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

        match role {
            Some(UserRole::Admin) => Ok(AdminUser(claims.sub)),
            Some(_) => {
                warn!(user_id = %claims.sub, "admin route denied");
                Err((StatusCode::FORBIDDEN, "Admin role required".to_string()))
            }
            None => Err((StatusCode::UNAUTHORIZED, "User not found".to_string())),
        }
    }
}
