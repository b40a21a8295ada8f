// call_id - execute a Bitbucket API operation
use super::{required_str, ToolHandler};
use crate::{
    bitbucket::{BitbucketClient, BODY_KEY},
    catalog::OperationCatalog,
    errors::{McpError, McpResult},
    mcp::types::{McpTool, ToolCallResult},
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub struct CallOperationTool {
    catalog: Arc<OperationCatalog>,
    client: Arc<BitbucketClient>,
}

impl CallOperationTool {
    pub fn new(catalog: Arc<OperationCatalog>, client: Arc<BitbucketClient>) -> Self {
        Self { catalog, client }
    }
}

#[async_trait]
impl ToolHandler for CallOperationTool {
    fn name(&self) -> &'static str {
        "call_id"
    }

    fn definition(&self) -> McpTool {
        McpTool {
            name: self.name().to_string(),
            description: "Execute a Bitbucket API operation. Path, query and header parameters \
                go in 'parameters' by name; the JSON request body goes in 'parameters.body'."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "string",
                        "description": "Operation id returned by search_ids"
                    },
                    "parameters": {
                        "type": "object",
                        "description": format!("Operation parameters; request body under '{}'", BODY_KEY),
                        "additionalProperties": true
                    }
                },
                "required": ["id"]
            }),
        }
    }

    async fn call(&self, args: Value) -> McpResult<ToolCallResult> {
        let id = required_str(&args, "id")?;
        let params: Map<String, Value> = match args.get("parameters") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(McpError::InvalidArguments("'parameters' must be an object".to_string()));
            }
        };

        let Some(operation) = self.catalog.get(id) else {
            return Ok(ToolCallResult::error(format!(
                "Operation not found: {}. Use search_ids to discover valid operation ids.",
                id
            )));
        };

        if operation.deprecated {
            tracing::warn!(operation = %id, "Calling deprecated operation");
        }

        let response = match self.client.execute(operation, &params).await {
            Ok(response) => response,
            Err(McpError::InvalidArguments(msg)) => return Ok(ToolCallResult::error(msg)),
            Err(McpError::Http(e)) => {
                tracing::error!(operation = %id, error = %e, "Bitbucket request failed");
                return Ok(ToolCallResult::error(format!("Request to Bitbucket failed: {}", e)));
            }
            Err(e) => return Err(e),
        };

        let payload = serde_json::to_value(&response)?;
        if response.is_success() {
            Ok(ToolCallResult::json(&payload))
        } else {
            Ok(ToolCallResult::error(serde_json::to_string_pretty(&payload)?))
        }
    }
}
