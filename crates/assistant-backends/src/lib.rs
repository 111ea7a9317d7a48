//! # assistant-backends
//!
//! Data sources the assistant can be pointed at, and the service that ties
//! them to the conversation engine.
//!
//! ## Backends
//!
//! ```text
//!  backend     schema description           tools
//!  ─────────   ──────────────────────────   ─────────────────────────────────────────
//!  sqlite      sqlite_master + pragmas      execute_sql_function, debug_sql_query
//!  postgres    pg_catalog + info schema     execute_sql_function, debug_sql_query
//!  ticketing   base URL + endpoint          execute_api_call
//! ```
//!
//! Exactly one backend is active per process. [`AssistantService::reconnect`]
//! swaps it atomically and clears every conversation.

pub mod catalog;
pub mod connection;
pub mod error;
pub mod format;
pub mod model;
pub mod prompts;
pub mod service;
pub mod sql;
pub mod ticketing;
pub mod tools;

pub use catalog::SchemaCatalog;
pub use connection::BackendConnection;
pub use error::{BackendError, Result};
pub use model::{BackendKind, ConnectionProfile, PostgresProfile, TicketingProfile};
pub use service::{ActiveBackend, AssistantService, BackendStatus, ChatReply};
pub use tools::{BackendTool, ToolName, Toolbox};
