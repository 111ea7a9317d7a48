//! # assistant-runtime
//!
//! Completion clients for the database assistant.
//!
//! ## Providers
//!
//! - **OpenAI-compatible** (default): any `/chat/completions` endpoint with
//!   native tool calling. Covers OpenAI, Azure OpenAI deployments and
//!   Ollama's `/v1` compatibility layer.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use assistant_runtime::OpenAiProvider;
//!
//! let provider = OpenAiProvider::from_env()?;
//! let orchestrator = Orchestrator::with_defaults(Arc::new(provider));
//! ```

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "openai")]
pub use openai::{AuthStyle, OpenAiConfig, OpenAiProvider};

// Re-export core types for convenience
pub use assistant_core::{
    AssistantError, Completion, GenerationOptions, LlmProvider, Message, Result, Role,
    ScriptedProvider,
};
