//! Query Debugging Tool
//!
//! Asks the completion endpoint for a corrected query. The correction is
//! returned as text and is not executed here; the model re-submits it through
//! `execute_sql_function` on its next round-trip.

use assistant_core::{GenerationOptions, LlmProvider, Message, ToolResult};

use super::{DebugSqlArgs, ToolName};
use crate::model::BackendKind;

pub fn correction_prompt(kind: BackendKind, args: &DebugSqlArgs, schema_description: &str) -> String {
    format!(
        "The following SQL query resulted in an error when executed against a {kind} database:\n\n\
         Query:\n{query}\n\n\
         Error message:\n{error}\n\n\
         Please provide a corrected SQL query that fixes the error, considering the database schema below.\n\
         Ensure the corrected query is valid for a {kind} database and does not modify any data.\n\n\
         Database Schema:\n{schema_description}",
        query = args.query,
        error = args.error_message,
    )
}

pub async fn debug_sql_query(
    provider: &dyn LlmProvider,
    options: &GenerationOptions,
    kind: BackendKind,
    schema_description: &str,
    args: &DebugSqlArgs,
) -> ToolResult {
    let name = ToolName::DebugSql.as_str();
    let messages = [Message::user(correction_prompt(kind, args, schema_description))];

    match provider.complete(&messages, &[], options).await {
        Ok(completion) => ToolResult::success(name, completion.content.trim()),
        Err(e) => {
            tracing::error!("Query correction failed: {}", e);
            ToolResult::failure(name, format!("I couldn't correct the query due to an error: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use assistant_core::ScriptedProvider;

    use super::*;

    fn args() -> DebugSqlArgs {
        DebugSqlArgs {
            query: "SELECT Nmae FROM artists".into(),
            error_message: "no such column: Nmae".into(),
        }
    }

    #[tokio::test]
    async fn test_returns_correction_verbatim_without_tools() {
        let provider = ScriptedProvider::new().then_text("  SELECT Name FROM artists\n");

        let result = debug_sql_query(
            &provider,
            &GenerationOptions::default(),
            BackendKind::Sqlite,
            "Table: artists",
            &args(),
        )
        .await;

        assert!(result.success);
        assert_eq!(result.output, "SELECT Name FROM artists");

        let requests = provider.requests().await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tool_names.is_empty());
        let prompt = &requests[0].messages[0].content;
        assert!(prompt.contains("no such column: Nmae"));
        assert!(prompt.contains("Table: artists"));
        assert!(prompt.contains("against a sqlite database"));
    }

    #[tokio::test]
    async fn test_transport_error_becomes_output() {
        let provider = ScriptedProvider::new().then_fail("503 Service Unavailable");

        let result = debug_sql_query(
            &provider,
            &GenerationOptions::default(),
            BackendKind::Postgres,
            "",
            &args(),
        )
        .await;

        assert!(!result.success);
        assert!(result.output.starts_with("I couldn't correct the query due to an error:"));
    }
}
