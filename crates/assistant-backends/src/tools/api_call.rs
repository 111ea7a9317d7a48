//! Ticketing API Tool

use assistant_core::ToolResult;

use super::{ApiCallArgs, ToolName};
use crate::ticketing::TicketingClient;

/// Query the default endpoint; transport and status errors become the output
pub async fn execute_api_call(client: &TicketingClient, args: &ApiCallArgs) -> ToolResult {
    let name = ToolName::ApiCall.as_str();

    match client.query(&args.params).await {
        Ok(result) => ToolResult::success(name, result.render()),
        Err(e) => {
            tracing::debug!(error = %e, "Ticketing API call failed");
            ToolResult::failure(name, e.to_string())
        }
    }
}
