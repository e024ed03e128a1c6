//! JSON-RPC 2.0 tool server (MCP). The stdio transport lives here and the
//! HTTP transports in [`http`].
//!
//! On stdio, stdout carries protocol messages only; logs go to stderr.

pub mod http;

use crate::tools::{Tool, ToolResult, find_tool};
use anyhow::Result;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "skygate";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

pub struct ToolServer {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolServer {
    pub fn new(tools: Vec<Box<dyn Tool>>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    /// Serve on the process's stdin/stdout until EOF or `shutdown`.
    pub async fn serve_stdio(&self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(tools = self.tools.len(), "Tool server listening on stdio");
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let (response, stop) = match serde_json::from_str::<Value>(&line) {
                Ok(message) => {
                    let stop = message.get("method").and_then(Value::as_str) == Some("shutdown");
                    (self.handle_message(&message).await, stop)
                }
                Err(e) => {
                    tracing::warn!("Unparsable request: {e}");
                    (Some(error_response(Value::Null, PARSE_ERROR, "parse error")), false)
                }
            };

            if let Some(response) = response {
                let mut payload = serde_json::to_vec(&response)?;
                payload.push(b'\n');
                writer.write_all(&payload).await?;
                writer.flush().await?;
            }
            if stop {
                break;
            }
        }

        tracing::info!("Tool server stopped");
        Ok(())
    }

    /// Parse and handle one raw message.
    pub async fn handle_text(&self, text: &str) -> Option<Value> {
        match serde_json::from_str::<Value>(text) {
            Ok(message) => self.handle_message(&message).await,
            Err(e) => {
                tracing::warn!("Unparsable request: {e}");
                Some(error_response(Value::Null, PARSE_ERROR, "parse error"))
            }
        }
    }

    /// Handle one message. Notifications (no `id`) produce no response.
    pub async fn handle_message(&self, message: &Value) -> Option<Value> {
        if message.is_array() {
            return Some(error_response(
                Value::Null,
                INVALID_REQUEST,
                "batch requests are not supported",
            ));
        }
        if !message.is_object() {
            return Some(error_response(Value::Null, INVALID_REQUEST, "invalid request"));
        }
        let id = message.get("id").cloned().filter(|v| !v.is_null());
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            return id.map(|id| error_response(id, INVALID_REQUEST, "missing method"));
        };
        let Some(id) = id else {
            tracing::debug!(method, "Notification");
            return None;
        };
        let params = message.get("params").cloned().unwrap_or_else(|| json!({}));

        let result = match method {
            "initialize" => {
                let protocol = params
                    .get("protocolVersion")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_PROTOCOL_VERSION);
                json!({
                    "protocolVersion": protocol,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION")
                    }
                })
            }
            "ping" | "shutdown" => json!({}),
            "tools/list" => {
                let specs: Vec<_> = self.tools.iter().map(|t| t.spec()).collect();
                json!({ "tools": specs })
            }
            "tools/call" => {
                let Some(name) = params.get("name").and_then(Value::as_str) else {
                    return Some(error_response(id, INVALID_PARAMS, "missing tool name"));
                };
                let arguments = params
                    .get("arguments")
                    .cloned()
                    .filter(|a| !a.is_null())
                    .unwrap_or_else(|| json!({}));
                self.call_tool(name, arguments).await
            }
            _ => {
                return Some(error_response(
                    id,
                    METHOD_NOT_FOUND,
                    &format!("method not found: {method}"),
                ));
            }
        };

        Some(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Value {
        let Some(tool) = find_tool(&self.tools, name) else {
            return call_result(&ToolResult::fail(format!("Unknown tool: {name}")));
        };

        tracing::debug!(tool = name, "Calling tool");
        match tool.execute(arguments).await {
            Ok(result) => call_result(&result),
            Err(e) => call_result(&ToolResult::fail(format!("Error: {e}"))),
        }
    }
}

fn call_result(result: &ToolResult) -> Value {
    let text = if result.success {
        result.output.clone()
    } else {
        result.error.clone().unwrap_or_else(|| "tool failed".into())
    };
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": !result.success
    })
}

pub(crate) fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "Uppercase text"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }

        async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
            let text = args
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("Missing 'text' parameter"))?;
            Ok(ToolResult::ok(text.to_uppercase()))
        }
    }

    fn server() -> ToolServer {
        ToolServer::new(vec![Box::new(UpperTool)])
    }

    #[tokio::test]
    async fn initialize_echoes_protocol_version() {
        let response = server()
            .handle_message(&json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": {"protocolVersion": "2025-03-26"}
            }))
            .await
            .unwrap();
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(response["result"]["serverInfo"]["name"], "skygate");
    }

    #[tokio::test]
    async fn tools_list_uses_input_schema() {
        let response = server()
            .handle_message(&json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"}))
            .await
            .unwrap();
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "upper");
        assert_eq!(tools[0]["inputSchema"]["required"][0], "text");
    }

    #[tokio::test]
    async fn tools_call_success_and_failure() {
        let srv = server();
        let ok = srv
            .handle_message(&json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {"name": "upper", "arguments": {"text": "hi"}}
            }))
            .await
            .unwrap();
        assert_eq!(ok["result"]["content"][0]["text"], "HI");
        assert_eq!(ok["result"]["isError"], false);

        let bad = srv
            .handle_message(&json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "upper"}
            }))
            .await
            .unwrap();
        assert_eq!(bad["result"]["isError"], true);
        assert_eq!(
            bad["result"]["content"][0]["text"],
            "Error: Missing 'text' parameter"
        );

        let unknown = srv
            .handle_message(&json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": {"name": "nope"}
            }))
            .await
            .unwrap();
        assert_eq!(unknown["result"]["isError"], true);
    }

    #[tokio::test]
    async fn unknown_method_and_notifications() {
        let srv = server();
        let response = srv
            .handle_message(&json!({"jsonrpc": "2.0", "id": 5, "method": "resources/list"}))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32601);

        assert!(srv
            .handle_message(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn batch_and_non_object_requests_are_invalid() {
        let srv = server();
        let batch = srv
            .handle_message(&json!([
                {"jsonrpc": "2.0", "id": 1, "method": "ping"},
                {"jsonrpc": "2.0", "id": 2, "method": "ping"}
            ]))
            .await
            .unwrap();
        assert_eq!(batch["error"]["code"], -32600);
        assert_eq!(batch["id"], Value::Null);

        let scalar = srv.handle_message(&json!(42)).await.unwrap();
        assert_eq!(scalar["error"]["code"], -32600);

        let raw = srv.handle_text("[]").await.unwrap();
        assert_eq!(raw["error"]["code"], -32600);
        let garbage = srv.handle_text("{oops").await.unwrap();
        assert_eq!(garbage["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn serve_processes_lines_until_shutdown() {
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n",
            "\n",
            "not json\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"shutdown\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"ping\"}\n",
        );
        let mut output = Vec::new();
        server()
            .serve(BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["error"]["code"], -32700);
        assert_eq!(responses[2]["id"], 2);
    }
}
