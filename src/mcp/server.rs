// MCP Server - JSON-RPC handler
use crate::{
    errors::{McpError, McpResult},
    mcp::types::*,
    tools::ToolManager,
};
use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

pub const SERVER_NAME: &str = "bitbucket-dc-mcp";

pub struct McpServer {
    tools: ToolManager,
}

impl McpServer {
    pub fn new(tools: ToolManager) -> Self {
        Self { tools }
    }

    pub async fn run(self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Reads newline-delimited JSON-RPC messages until EOF.
    ///
    /// Requests run concurrently and responses are written as they complete,
    /// so a slow tool call does not hold up `ping` or other requests. Requests
    /// still in flight at EOF are answered before returning.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("MCP server listening on stdio with {} tools", self.tools.tool_count());

        let mut lines = reader.lines();
        let mut in_flight = FuturesUnordered::new();
        let mut input_open = true;

        loop {
            tokio::select! {
                line = lines.next_line(), if input_open => {
                    let Some(line) = line? else {
                        input_open = false; // EOF
                        continue;
                    };

                    let message = line.trim().to_string();
                    if message.is_empty() {
                        continue;
                    }

                    debug!("Received request: {}", message);
                    in_flight.push(async move { self.handle_message(&message).await });
                }
                Some(response) = in_flight.next(), if !in_flight.is_empty() => {
                    let Some(response) = response else {
                        continue;
                    };

                    let response_str = serde_json::to_string(&response)?;
                    debug!("Sending response: {}", response_str);

                    writer.write_all(response_str.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await?;
                }
                else => break,
            }
        }

        info!("MCP client disconnected");
        Ok(())
    }

    /// Returns `None` for notifications.
    pub async fn handle_message(&self, message: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(request) => request,
            Err(e) => {
                error!("Malformed JSON-RPC message: {}", e);
                return Some(self.error_response(None, McpError::Json(e)));
            }
        };

        let is_notification = request.id.is_none();
        let result = self.dispatch(&request.method, request.params).await;

        if is_notification {
            if let Err(e) = result {
                debug!(method = %request.method, "Notification not handled: {}", e);
            }
            return None;
        }

        Some(match result {
            Ok(value) => JsonRpcResponse {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id: request.id,
                result: Some(value),
                error: None,
            },
            Err(e) => {
                if !matches!(e, McpError::MethodNotFound(_)) {
                    error!(method = %request.method, "Error handling request: {}", e);
                }
                self.error_response(request.id, e)
            }
        })
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        match method {
            "initialize" => self.initialize(params),
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(params).await,
            "notifications/initialized" | "notifications/cancelled" => Ok(Value::Null),
            _ => Err(McpError::MethodNotFound(format!("Unknown method: {}", method))),
        }
    }

    fn initialize(&self, params: Option<Value>) -> McpResult<Value> {
        // Parse client info if provided
        let client_info = params
            .and_then(|p| p.get("clientInfo").cloned())
            .and_then(|c| serde_json::from_value::<ClientInfo>(c).ok());

        if let Some(info) = &client_info {
            info!("Client: {} v{}", info.name, info.version);
        }

        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        }))
    }

    fn list_tools(&self) -> McpResult<Value> {
        Ok(json!({ "tools": self.tools.list_tools() }))
    }

    async fn call_tool(&self, params: Option<Value>) -> McpResult<Value> {
        let call_request: ToolCallRequest = serde_json::from_value(
            params.ok_or_else(|| McpError::InvalidArguments("Missing params".to_string()))?,
        )
        .map_err(|e| McpError::InvalidArguments(format!("Invalid tools/call params: {}", e)))?;

        let result = self
            .tools
            .call_tool(&call_request.name, call_request.arguments)
            .await?;

        Ok(serde_json::to_value(result)?)
    }

    fn error_response(&self, id: Option<Value>, error: McpError) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error.to_jsonrpc_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolHandler;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct UpperTool;

    #[async_trait]
    impl ToolHandler for UpperTool {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn definition(&self) -> McpTool {
            McpTool {
                name: "upper".to_string(),
                description: "Uppercase text".to_string(),
                input_schema: json!({ "type": "object" }),
            }
        }

        async fn call(&self, args: Value) -> McpResult<ToolCallResult> {
            let text = crate::tools::required_str(&args, "text")?;
            Ok(ToolCallResult::success(text.to_uppercase()))
        }
    }

    /// Answers after `ms` milliseconds.
    struct SlowTool;

    #[async_trait]
    impl ToolHandler for SlowTool {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn definition(&self) -> McpTool {
            McpTool {
                name: "slow".to_string(),
                description: "Answers after a delay".to_string(),
                input_schema: json!({ "type": "object" }),
            }
        }

        async fn call(&self, args: Value) -> McpResult<ToolCallResult> {
            let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            Ok(ToolCallResult::success("done".to_string()))
        }
    }

    fn server() -> McpServer {
        let mut tools = ToolManager::new();
        tools.register(Arc::new(UpperTool));
        tools.register(Arc::new(SlowTool));
        McpServer::new(tools)
    }

    async fn run_session(input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        server().serve(input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn by_id(responses: &[Value], id: u64) -> &Value {
        responses.iter().find(|r| r["id"] == id).unwrap()
    }

    #[tokio::test]
    async fn serves_a_session_over_a_stream() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"clientInfo":{"name":"test","version":"1.0"}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"upper","arguments":{"text":"hi"}}}"#,
            "\n",
        );
        let responses = run_session(input).await;

        assert_eq!(responses.len(), 3);
        assert_eq!(by_id(&responses, 1)["result"]["serverInfo"]["name"], SERVER_NAME);
        let tools = &by_id(&responses, 2)["result"]["tools"];
        assert_eq!(tools[0]["name"], "upper");
        assert!(tools[0].get("inputSchema").is_some());
        assert_eq!(by_id(&responses, 3)["result"]["content"][0]["text"], "HI");
    }

    #[tokio::test]
    async fn slow_tool_call_does_not_block_ping() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"slow","arguments":{"ms":200}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        );
        let responses = run_session(input).await;

        // Both are answered before EOF returns, ping first.
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 2);
        assert_eq!(responses[1]["id"], 1);
        assert_eq!(responses[1]["result"]["content"][0]["text"], "done");
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let response = server()
            .handle_message(r#"{"jsonrpc":"2.0","id":7,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn bad_tool_arguments_are_invalid_params() {
        let response = server()
            .handle_message(r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"upper","arguments":{}}}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn malformed_json_is_parse_error() {
        let response = server().handle_message("{not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, -32700);
        assert!(response.id.is_none());
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let response = server()
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{}}"#)
            .await;
        assert!(response.is_none());
    }
}
