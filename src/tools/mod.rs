// MCP Tools - search, inspect and call Bitbucket operations
pub mod call;
pub mod details;
pub mod manager;
pub mod search;

pub use call::CallOperationTool;
pub use details::OperationDetailsTool;
pub use manager::ToolManager;
pub use search::SearchOperationsTool;

use crate::{errors::McpResult, mcp::types::{McpTool, ToolCallResult}};
use async_trait::async_trait;
use serde_json::Value;

/// Common interface for every tool exposed over MCP.
///
/// Failures the model can act on (bad query, unknown operation, API error)
/// come back as a `ToolCallResult` with `isError`; `Err` is reserved for
/// malformed calls.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Tool name as listed to clients
    fn name(&self) -> &'static str;

    fn definition(&self) -> McpTool;

    async fn call(&self, args: Value) -> McpResult<ToolCallResult>;
}

/// Reads a required string argument.
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> McpResult<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| crate::errors::McpError::InvalidArguments(format!("Missing '{}' argument", key)))
}
