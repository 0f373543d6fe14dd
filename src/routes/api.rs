use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{health, search, session};
use crate::state::AppState;
use std::sync::Arc;

/// Create the API router. Mounted under `/api` in `main`.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", post(session::openai_session_handler))
        .route(
            "/elevenlabs/session",
            post(session::elevenlabs_session_handler),
        )
        .route("/search", post(search::search_handler))
        .route("/health", get(health::health_check))
        .layer(TraceLayer::new_for_http())
}
