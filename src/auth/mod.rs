//! HTTP transport over the auth service.

use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod extractors;
pub mod handlers;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
