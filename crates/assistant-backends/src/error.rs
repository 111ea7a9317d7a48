//! Error Types for Backends

use assistant_core::AssistantError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackendError>;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{0}")]
    Connection(String),

    #[error("Schema introspection failed: {0}")]
    Introspection(String),

    #[error("Invalid connection profile: {0}")]
    InvalidProfile(String),

    #[error("{0}")]
    Database(#[from] sqlx::Error),

    #[error("An error occurred during the API call: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    /// Errors that mean the backend cannot be used at all
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Introspection(_) | Self::InvalidProfile(_)
        )
    }
}

impl From<BackendError> for AssistantError {
    fn from(err: BackendError) -> Self {
        if err.is_connection_error() {
            Self::ConnectionFailure(err.to_string())
        } else {
            Self::BackendExecution(err.to_string())
        }
    }
}
