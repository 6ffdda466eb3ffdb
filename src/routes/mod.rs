pub mod account;
pub mod auth;
pub mod channel_events;
pub mod client;
pub mod health;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::services::ServeDir;

use crate::middleware::{csrf, rate_limit, request_id};
use crate::state::AppState;

/// Maximum request body size: 64 KiB.
const MAX_BODY_SIZE: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let pages = Router::new()
        .merge(auth::router())
        .nest("/account", account::router())
        .nest("/r", channel_events::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit::auth_rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            csrf::csrf_cookie_middleware,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    Router::new()
        .merge(pages)
        .nest("/health", health::router())
        .nest_service("/css", ServeDir::new("static/css"))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}
