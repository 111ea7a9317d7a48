//! SQL Execution Tool

use assistant_core::ToolResult;

use super::{ExecuteSqlArgs, ToolName};
use crate::format::markdown_table;
use crate::sql::SqlBackend;

pub const ONLY_SELECT_MESSAGE: &str = "Only SELECT queries are allowed.";

/// The only read-only gate: trimmed, upper-cased text must start with `SELECT`
pub fn is_read_only(query: &str) -> bool {
    query.trim_start().to_uppercase().starts_with("SELECT")
}

/// Run a read-only query and render it as a Markdown table
///
/// Rejected statements never reach `backend`. Backend errors come back as the
/// tool output so the model can debug the query.
pub async fn execute_sql(backend: &dyn SqlBackend, args: &ExecuteSqlArgs) -> ToolResult {
    let name = ToolName::ExecuteSql.as_str();

    if !is_read_only(&args.query) {
        tracing::warn!(query = %args.query, "Rejected non-SELECT statement");
        return ToolResult::failure(name, ONLY_SELECT_MESSAGE);
    }

    match backend.fetch(&args.query).await {
        Ok(output) => ToolResult::success(name, markdown_table(&output.columns, &output.rows)),
        Err(e) => {
            tracing::debug!(error = %e, "Query failed");
            ToolResult::failure(name, e.to_string())
        }
    }
}
