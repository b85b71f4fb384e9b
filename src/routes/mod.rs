//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the HTTP API and the websocket endpoint under a single
//! Axum router. When `STATIC_DIR` is configured the browser UI is served
//! from it as the fallback route.

pub mod api;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// API and websocket routes.
fn api_routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/groups", get(api::list_groups).post(api::create_group))
        .route("/api/messages", get(api::group_history))
        .route("/api/private", get(api::private_history))
        .route("/api/admin/news", post(api::post_news))
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Full application router.
pub fn app(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();
    let router = api_routes(state);
    match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true)),
        None => router,
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
