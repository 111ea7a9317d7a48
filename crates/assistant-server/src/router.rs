//! Router

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{backend_status, chat_handler, connect, connect_env, health_check, schema};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/backend", get(backend_status))
        .route("/api/schema", get(schema))
        // Assistant API
        .route("/api/chat", post(chat_handler))
        .route("/api/connect", post(connect))
        .route("/api/connect/env", post(connect_env))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
