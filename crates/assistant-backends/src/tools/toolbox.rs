//! Toolbox
//!
//! The [`ToolDispatcher`] for one chat exchange, bound to the backend that
//! was current when the exchange started.

use std::sync::Arc;

use assistant_core::{
    AssistantError, GenerationOptions, LlmProvider, ToolCall, ToolDispatcher, ToolResult, ToolSchema,
};
use async_trait::async_trait;

use super::{BackendTool, ToolName, ToolParseError, api_call, debug_sql, declarations, execute_sql};
use crate::connection::BackendConnection;
use crate::service::ActiveBackend;

pub struct Toolbox {
    backend: Arc<ActiveBackend>,
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl Toolbox {
    pub fn new(
        backend: Arc<ActiveBackend>,
        provider: Arc<dyn LlmProvider>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            backend,
            provider,
            options,
        }
    }

    pub fn backend(&self) -> &ActiveBackend {
        &self.backend
    }

    async fn run(&self, tool: &BackendTool) -> ToolResult {
        let backend = &self.backend;

        match (tool, backend.connection()) {
            (BackendTool::ExecuteSql(args), BackendConnection::Sql(sql)) => {
                execute_sql::execute_sql(sql.as_ref(), args).await
            }
            (BackendTool::DebugSql(args), BackendConnection::Sql(_)) => {
                debug_sql::debug_sql_query(
                    self.provider.as_ref(),
                    &self.options,
                    backend.kind(),
                    backend.description(),
                    args,
                )
                .await
            }
            (BackendTool::ApiCall(args), BackendConnection::Ticketing(client)) => {
                api_call::execute_api_call(client, args).await
            }
            (tool, _) => ToolResult::failure(
                tool.name().as_str(),
                ToolParseError::Undeclared(tool.name().to_string()).to_string(),
            ),
        }
    }
}

#[async_trait]
impl ToolDispatcher for Toolbox {
    fn declarations(&self) -> Vec<ToolSchema> {
        declarations(self.backend.kind(), self.backend.description())
    }

    fn is_declared(&self, name: &str) -> bool {
        ToolName::parse(name).is_some_and(|tool| ToolName::for_backend(self.backend.kind()).contains(&tool))
    }

    async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let result = match BackendTool::parse(call, self.backend.kind()) {
            Ok(tool) => {
                tracing::debug!(tool = %tool.name(), backend = %self.backend.kind(), "Dispatching");
                self.run(&tool).await
            }
            Err(ToolParseError::Undeclared(name)) => {
                tracing::warn!(tool = %name, "Undeclared tool reached the dispatcher");
                ToolResult::failure(&call.name, AssistantError::UnknownTool(name).to_string())
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Rejected tool arguments");
                ToolResult::failure(&call.name, AssistantError::Validation(e.to_string()).to_string())
            }
        };
        result.with_id(&call.id)
    }
}
