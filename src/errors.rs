// Error Types
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type McpResult<T> = Result<T, McpError>;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpErrorResponse {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl McpError {
    pub fn to_jsonrpc_error(&self) -> McpErrorResponse {
        match self {
            McpError::MethodNotFound(msg) | McpError::ToolNotFound(msg) => McpErrorResponse {
                code: -32601,
                message: msg.clone(),
                data: None,
            },
            McpError::InvalidArguments(msg) => McpErrorResponse {
                code: -32602,
                message: msg.clone(),
                data: None,
            },
            McpError::Json(e) => McpErrorResponse {
                code: -32700,
                message: format!("Parse error: {}", e),
                data: None,
            },
            _ => McpErrorResponse {
                code: -32603,
                message: self.to_string(),
                data: None,
            },
        }
    }
}

/// Failures surfaced by the semantic search pipeline.
///
/// Callers match on this small taxonomy regardless of which embedding model or
/// storage engine sits underneath. Cache failures never appear here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    /// Malformed caller input. Never retried.
    #[error("Invalid search query: {0}")]
    Validation(String),

    /// Embedding model failed to load or to produce a vector.
    #[error("Embedding model error: {0}")]
    ModelLoad(String),

    /// Vector index could not execute the similarity search.
    #[error("Embeddings database error: {0}")]
    Database(String),

    /// Raised by callers that race the search against a deadline.
    #[error("Search timed out after {0}ms")]
    Timeout(u64),
}

impl SearchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SearchError::Validation(_))
    }

    /// Message shown to MCP clients at the tool boundary.
    pub fn user_message(&self) -> String {
        match self {
            SearchError::Validation(msg) => format!("Invalid query: {}. Please fix your query and try again.", msg),
            SearchError::ModelLoad(_) | SearchError::Database(_) => {
                "Search service is temporarily unavailable. Please try again.".to_string()
            }
            SearchError::Timeout(ms) => format!("Search took too long (over {}ms). Please try again.", ms),
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    #[error("Cache storage failure: {0}")]
    Storage(String),
}
