use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    /// Successful result carrying pretty-printed JSON.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::ok(serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()))
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Description of a tool for protocol clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub parameters: serde_json::Value,
}

/// Core tool trait
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as exposed to callers
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with given arguments.
    ///
    /// Invalid arguments are `Err`; remote failures are a failed [`ToolResult`].
    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult>;

    /// Get the full spec for registration
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the value argument"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "value": { "type": "string" }
                }
            })
        }

        async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
            Ok(ToolResult::ok(
                args.get("value")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default(),
            ))
        }
    }

    #[test]
    fn spec_serializes_schema_as_input_schema() {
        let spec = EchoTool.spec();

        assert_eq!(spec.name, "echo");
        assert_eq!(spec.description, "Echo the value argument");
        assert_eq!(spec.parameters["type"], "object");

        let wire = serde_json::to_value(&spec).unwrap();
        assert_eq!(wire["inputSchema"]["properties"]["value"]["type"], "string");
    }

    #[tokio::test]
    async fn echo_returns_value_argument() {
        let result = EchoTool
            .execute(serde_json::json!({ "value": "hello-tool" }))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "hello-tool");
        assert!(result.error.is_none());
    }

    #[test]
    fn json_result_is_pretty_printed() {
        let result = ToolResult::json(&serde_json::json!({"a": 1}));
        assert!(result.success);
        assert_eq!(result.output, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn fail_carries_error_only() {
        let result = ToolResult::fail("boom");
        assert!(!result.success);
        assert!(result.output.is_empty());
        assert_eq!(result.error.as_deref(), Some("boom"));
    }
}
