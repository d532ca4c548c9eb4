use crate::state::AppState;
use axum::Router;

mod claims;
mod dto;
pub mod handlers;
pub mod services;
pub(crate) mod extractors;

pub use claims::{Claims, JwtKeys, TokenKind};
pub use extractors::{AdminUser, AuthUser, OptionalAuthUser};

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
