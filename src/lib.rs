// Bitbucket Data Center MCP server
// Semantic discovery and execution of Bitbucket REST operations for AI agents

pub mod bitbucket;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod health;
pub mod index;
pub mod logging;
pub mod mcp;
pub mod schema;
pub mod search;
pub mod tools;

pub use config::McpConfig;
pub use errors::{McpError, McpResult, SearchError};
pub use mcp::McpServer;
pub use search::SemanticSearchService;
pub use tools::ToolManager;
