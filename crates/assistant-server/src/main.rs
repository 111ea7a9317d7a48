//! Database Assistant HTTP Server
//!
//! Axum-based server exposing the chat and reconnect contracts. Starts on the
//! embedded SQLite database; other backends are reached through
//! `/api/connect` or `/api/connect/env`.

mod config;
mod handlers;
mod router;
mod state;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assistant_backends::{AssistantService, BackendKind, ConnectionProfile};
use assistant_core::LlmProvider;
use assistant_runtime::OpenAiProvider;

use crate::config::ServerConfig;
use crate::router::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    // Initialize LLM provider
    let provider = Arc::new(OpenAiProvider::from_env()?);
    match provider.health_check().await {
        Ok(true) => tracing::info!(model = %config.orchestrator.generation.model, "✓ Completion endpoint reachable"),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ Completion endpoint not available - chat requests will fail");
            tracing::warn!("  Check LLM_BASE_URL and LLM_API_KEY");
        }
    }

    // Connect the default backend
    let profile = ConnectionProfile::sqlite(&config.profiles.sqlite_path);
    let service = AssistantService::start(provider, profile, config.orchestrator.clone())
        .await
        .with_context(|| {
            format!(
                "failed to open the default SQLite database at {}",
                config.profiles.sqlite_path.display()
            )
        })?;

    for kind in [BackendKind::Postgres, BackendKind::Ticketing] {
        if config.profiles.is_available(kind) {
            tracing::info!("✓ {} profile configured", kind);
        }
    }

    let app = build_router(AppState::new(service, config.profiles.clone()));

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 db-assistant server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health           - Health check");
    tracing::info!("  GET  /api/backend      - Current backend and env profiles");
    tracing::info!("  GET  /api/schema       - Schema description");
    tracing::info!("  POST /api/chat         - Send message");
    tracing::info!("  POST /api/connect      - Reconnect with credentials");
    tracing::info!("  POST /api/connect/env  - Reconnect with an env profile");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
