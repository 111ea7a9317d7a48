//! # assistant-core
//!
//! Schema-aware, tool-calling conversation engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                           │
//! │  ┌──────────────┐  ┌────────────────┐  ┌──────────────────┐  │
//! │  │ Conversation │  │ ToolDispatcher │  │   LlmProvider    │  │
//! │  │    Store     │──│ (backend tools)│──│ (Completion API) │  │
//! │  └──────────────┘  └────────────────┘  └──────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The crate knows nothing about databases: backends plug in through
//! [`ToolDispatcher`], language models through [`LlmProvider`].

pub mod error;
pub mod message;
pub mod orchestrator;
pub mod provider;
pub mod scripted;
pub mod store;
pub mod tool;

pub use error::{AssistantError, Result};
pub use message::{Conversation, Message, Role};
pub use orchestrator::{Orchestrator, OrchestratorConfig, Termination, TurnOutcome, TurnState};
pub use provider::{Completion, GenerationOptions, LlmProvider};
pub use scripted::ScriptedProvider;
pub use store::{ConversationKey, ConversationStore};
pub use tool::{ParameterSchema, ToolCall, ToolDispatcher, ToolResult, ToolSchema};
