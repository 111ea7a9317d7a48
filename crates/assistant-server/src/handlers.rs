//! HTTP Handlers

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use assistant_backends::{BackendKind, BackendStatus, ChatReply, ConnectionProfile};
use assistant_core::{AssistantError, ConversationKey};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: BackendKind,
    pub llm_connected: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Defaults to the shared `default` conversation
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Always carries a `message`, even when the turn failed
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    #[serde(flatten)]
    pub reply: ChatReply,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectEnvRequest {
    pub backend: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BackendStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectResponse {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AvailableBackend {
    pub backend: BackendKind,
    pub display_name: String,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct BackendResponse {
    pub current: BackendStatus,
    pub profiles: Vec<AvailableBackend>,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub backend: BackendKind,
    pub schema: String,
}

type ConnectResult = (StatusCode, Json<ConnectResponse>);

fn status_code(err: &AssistantError) -> StatusCode {
    match err {
        AssistantError::Validation(_) => StatusCode::BAD_REQUEST,
        AssistantError::ConnectionFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        AssistantError::ModelTransport(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let llm_connected = state.service.provider().health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.service.status().await.backend,
        llm_connected,
    })
}

/// Current backend and the env profiles that could replace it
pub async fn backend_status(State(state): State<AppState>) -> Json<BackendResponse> {
    let profiles = [BackendKind::Sqlite, BackendKind::Postgres, BackendKind::Ticketing]
        .into_iter()
        .map(|kind| AvailableBackend {
            backend: kind,
            display_name: state.profiles.profile(kind).display_name(),
            available: state.profiles.is_available(kind),
        })
        .collect();

    Json(BackendResponse {
        current: state.service.status().await,
        profiles,
    })
}

pub async fn schema(State(state): State<AppState>) -> Json<SchemaResponse> {
    let backend = state.service.current().await;
    Json(SchemaResponse {
        backend: backend.kind(),
        schema: backend.description().to_string(),
    })
}

impl ChatResponse {
    fn failed(status: StatusCode, message: String) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                reply: ChatReply {
                    message: message.clone(),
                    ..ChatReply::default()
                },
                error: Some(message),
            }),
        )
    }
}

/// Main chat endpoint
pub async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> (StatusCode, Json<ChatResponse>) {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            tracing::warn!("Rejected chat body: {}", rejection.body_text());
            return ChatResponse::failed(
                rejection.status(),
                format!("Invalid request: {}", rejection.body_text()),
            );
        }
    };

    let key = payload
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .map_or_else(ConversationKey::default, ConversationKey::from_string);

    match state.service.chat(&key, &payload.message).await {
        Ok(reply) => (StatusCode::OK, Json(ChatResponse { reply, error: None })),
        Err(e) => {
            tracing::error!(conversation = %key, "Chat error: {}", e);
            ChatResponse::failed(status_code(&e), e.user_message())
        }
    }
}

/// Reconnect with explicit credentials
pub async fn connect(
    State(state): State<AppState>,
    Json(profile): Json<ConnectionProfile>,
) -> ConnectResult {
    reconnect(&state, profile).await
}

/// Reconnect with a pre-configured profile
pub async fn connect_env(
    State(state): State<AppState>,
    Json(payload): Json<ConnectEnvRequest>,
) -> ConnectResult {
    let Some(kind) = BackendKind::parse(&payload.backend) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ConnectResponse::failed("Unsupported database type.")),
        );
    };

    if !state.profiles.is_available(kind) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ConnectResponse::failed(format!("Incomplete credentials for {kind}."))),
        );
    }

    reconnect(&state, state.profiles.profile(kind)).await
}

async fn reconnect(state: &AppState, profile: ConnectionProfile) -> ConnectResult {
    match state.service.reconnect(profile).await {
        Ok(status) => (
            StatusCode::OK,
            Json(ConnectResponse {
                success: true,
                status: Some(status),
                error: None,
            }),
        ),
        Err(e) => (status_code(&e), Json(ConnectResponse::failed(e.user_message()))),
    }
}
