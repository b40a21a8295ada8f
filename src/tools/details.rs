// get_id - full description of one API operation
use super::{required_str, ToolHandler};
use crate::{
    catalog::OperationCatalog,
    errors::McpResult,
    mcp::types::{McpTool, ToolCallResult},
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct OperationDetailsTool {
    catalog: Arc<OperationCatalog>,
}

impl OperationDetailsTool {
    pub fn new(catalog: Arc<OperationCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ToolHandler for OperationDetailsTool {
    fn name(&self) -> &'static str {
        "get_id"
    }

    fn definition(&self) -> McpTool {
        McpTool {
            name: self.name().to_string(),
            description: "Get the full definition of a Bitbucket API operation: method, path, \
                parameters and request body schema."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "string",
                        "description": "Operation id returned by search_ids"
                    }
                },
                "required": ["id"]
            }),
        }
    }

    async fn call(&self, args: Value) -> McpResult<ToolCallResult> {
        let id = required_str(&args, "id")?;
        match self.catalog.get(id) {
            Some(operation) => Ok(ToolCallResult::json(&serde_json::to_value(operation)?)),
            None => Ok(ToolCallResult::error(format!(
                "Operation not found: {}. Use search_ids to discover valid operation ids.",
                id
            ))),
        }
    }
}
