//! Administrative JSON API.
//!
//! # Endpoints
//! - `GET /api/status`: version, uptime, pages and routes of the live site
//! - `POST /api/flush`: `{ "path": "*" }` flushes every cached entry,
//!   `{ "path": "/some/path" }` the datasources of the page it routes to
//!
//! # Design Decisions
//! - Bearer token from `[admin].api_key`, read from the live config so a
//!   reload rotates it
//! - Mounted only when `[admin].enabled` is set at startup

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::{flush, get_status};
use crate::http::server::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/flush", post(flush))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}
