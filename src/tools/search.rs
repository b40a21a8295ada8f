// search_ids - semantic search over Bitbucket API operations
use super::ToolHandler;
use crate::{
    errors::{McpResult, SearchError},
    mcp::types::{McpTool, ToolCallResult},
    search::SemanticSearchService,
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub struct SearchOperationsTool {
    service: Arc<SemanticSearchService>,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct OperationHit {
    operation_id: String,
    summary: String,
    similarity_score: f32,
}

#[derive(Debug, Serialize)]
struct SearchOutput {
    operations: Vec<OperationHit>,
}

impl SearchOperationsTool {
    pub fn new(service: Arc<SemanticSearchService>) -> Self {
        let timeout = Duration::from_millis(service.config().timeout_ms);
        Self { service, timeout }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, query: Option<&str>, limit: Option<f64>) -> Result<SearchOutput, SearchError> {
        let results = tokio::time::timeout(self.timeout, self.service.search(query, limit))
            .await
            .map_err(|_| SearchError::Timeout(self.timeout.as_millis() as u64))??;

        Ok(SearchOutput {
            operations: results
                .into_iter()
                .map(|r| OperationHit {
                    operation_id: r.operation_id,
                    summary: r.summary,
                    similarity_score: clamp_score(r.similarity_score),
                })
                .collect(),
        })
    }
}

fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

#[async_trait]
impl ToolHandler for SearchOperationsTool {
    fn name(&self) -> &'static str {
        "search_ids"
    }

    fn definition(&self) -> McpTool {
        let config = self.service.config();
        McpTool {
            name: self.name().to_string(),
            description: "Search Bitbucket Data Center REST API operations using natural language. \
                Returns ranked operation ids to inspect with get_id and execute with call_id."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What you want to do, e.g. 'list pull requests for a repository'",
                        "maxLength": config.max_query_length
                    },
                    "limit": {
                        "type": "integer",
                        "description": format!("Max results (default: {})", config.default_limit),
                        "minimum": config.min_limit,
                        "maximum": config.max_limit,
                        "default": config.default_limit
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: Value) -> McpResult<ToolCallResult> {
        let query = args.get("query").and_then(Value::as_str);
        let limit = args.get("limit").and_then(Value::as_f64);

        match self.run(query, limit).await {
            Ok(output) => Ok(ToolCallResult::json(&serde_json::to_value(output)?)),
            Err(e) => {
                tracing::warn!(error = %e, "search_ids failed");
                Ok(ToolCallResult::error(e.user_message()))
            }
        }
    }
}
