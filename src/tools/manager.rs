// Tool Manager - Routes tool calls to the matching handler
use super::{CallOperationTool, OperationDetailsTool, SearchOperationsTool, ToolHandler};
use crate::{
    bitbucket::BitbucketClient,
    catalog::OperationCatalog,
    errors::{McpError, McpResult},
    mcp::types::{McpTool, ToolCallResult},
    search::SemanticSearchService,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ToolManager {
    tools: HashMap<&'static str, Arc<dyn ToolHandler>>,
    // Listing order
    order: Vec<&'static str>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registers the three Bitbucket tools.
    pub fn with_default_tools(
        search: Arc<SemanticSearchService>,
        catalog: Arc<OperationCatalog>,
        client: Arc<BitbucketClient>,
    ) -> Self {
        let mut manager = Self::new();
        manager.register(Arc::new(SearchOperationsTool::new(search)));
        manager.register(Arc::new(OperationDetailsTool::new(Arc::clone(&catalog))));
        manager.register(Arc::new(CallOperationTool::new(catalog, client)));
        manager
    }

    pub fn register(&mut self, tool: Arc<dyn ToolHandler>) {
        let name = tool.name();
        if self.tools.insert(name, tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn list_tools(&self) -> Vec<McpTool> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    pub async fn call_tool(&self, name: &str, args: Value) -> McpResult<ToolCallResult> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| McpError::ToolNotFound(format!("Unknown tool: {}", name)))?;

        let started = std::time::Instant::now();
        let result = tool.call(args).await;
        tracing::info!(
            tool = name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = matches!(&result, Ok(r) if !r.is_error()),
            "Tool call finished"
        );
        result
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}
