//! Error Types

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

/// Assistant error types
#[derive(Error, Debug)]
pub enum AssistantError {
    /// Backend unreachable, bad credentials, or schema introspection failed
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    /// A statement or tool argument was rejected before execution
    #[error("Validation failure: {0}")]
    Validation(String),

    /// Query or API call failed on the backend
    #[error("Backend execution failure: {0}")]
    BackendExecution(String),

    /// Completion endpoint unreachable or returned an error
    #[error("Model transport failure: {0}")]
    ModelTransport(String),

    /// Model requested a tool that was never declared
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Conversation store misuse (e.g. append to an unseeded key)
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AssistantError {
    /// Only connection and transport failures are surfaced to callers as hard failures.
    pub const fn is_hard_failure(&self) -> bool {
        matches!(self, Self::ModelTransport(_) | Self::ConnectionFailure(_))
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::ConnectionFailure(msg) => format!("Failed to connect: {msg}"),
            Self::Validation(msg) => format!("Invalid request: {msg}"),
            Self::BackendExecution(msg) => format!("The data source returned an error: {msg}"),
            Self::ModelTransport(_) => {
                "An error occurred while communicating with the AI assistant.".into()
            }
            Self::UnknownTool(_) => "I'm sorry, I cannot perform the requested action.".into(),
            Self::Config(msg) => format!("Service configuration error: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AssistantError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failures_hide_details() {
        let err = AssistantError::ModelTransport("connection refused (os error 111)".into());
        assert!(err.is_hard_failure());
        assert!(!err.user_message().contains("os error"));
    }

    #[test]
    fn test_tool_errors_are_not_hard_failures() {
        assert!(!AssistantError::BackendExecution("no such table".into()).is_hard_failure());
        assert!(!AssistantError::Validation("only SELECT".into()).is_hard_failure());
    }
}
