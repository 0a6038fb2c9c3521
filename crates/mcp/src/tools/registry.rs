// MCP tool registry: a closed catalog keyed by tool identifier

use crate::protocol::{CallToolResult, JsonRpcError, ToolSchema};
use anyhow::Result;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Tool executor trait
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool schema for MCP
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments.
    ///
    /// Returning a [`ToolError`] inside the `anyhow::Error` marks a protocol
    /// failure (surfaced as a JSON-RPC error); any other error is wrapped
    /// into an `isError` result by the registry.
    async fn execute(&self, arguments: Map<String, Value>) -> Result<CallToolResult>;
}

/// Every tool the gateway can serve, in catalog order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    AirbnbSearch,
    AirbnbListingDetails,
}

impl ToolName {
    pub const ALL: [ToolName; 2] = [ToolName::AirbnbSearch, ToolName::AirbnbListingDetails];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AirbnbSearch => "airbnb_search",
            Self::AirbnbListingDetails => "airbnb_listing_details",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ToolError::UnknownTool(s.to_string()))
    }
}

/// Protocol-level tool failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

impl ToolError {
    pub fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            Self::UnknownTool(_) => JsonRpcError::method_not_found(self.to_string()),
            Self::InvalidArguments { .. } => JsonRpcError::invalid_params(self.to_string()),
        }
    }
}

/// A collaborator failure that is not a protocol error
#[derive(Debug, Clone)]
pub struct ToolExecutionError {
    pub tool: ToolName,
    pub message: String,
}

impl ToolExecutionError {
    pub fn into_result(self) -> CallToolResult {
        CallToolResult::json(
            &serde_json::json!({
                "error": format!("Tool execution failed: {}", self.message),
                "tool": self.tool.as_str(),
            }),
            true,
        )
    }
}

/// Tool registry. Immutable once built; one implementation per [`ToolName`].
pub struct ToolRegistry {
    search: Arc<dyn Tool>,
    listing_details: Arc<dyn Tool>,
}

impl ToolRegistry {
    pub fn new(search: Arc<dyn Tool>, listing_details: Arc<dyn Tool>) -> Self {
        Self {
            search,
            listing_details,
        }
    }

    /// Get the implementation behind a tool identifier
    pub fn get(&self, name: ToolName) -> &Arc<dyn Tool> {
        match name {
            ToolName::AirbnbSearch => &self.search,
            ToolName::AirbnbListingDetails => &self.listing_details,
        }
    }

    /// List all tool schemas in declaration order
    pub fn list(&self) -> Vec<ToolSchema> {
        ToolName::ALL
            .into_iter()
            .map(|name| {
                let mut schema = self.get(name).schema();
                schema.name = name.as_str().to_string();
                schema
            })
            .collect()
    }

    /// Invoke a tool by wire name. Unknown names are rejected before any
    /// collaborator runs.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, ToolError> {
        let tool_name: ToolName = name.parse()?;

        tracing::debug!(tool = %tool_name, "Invoking tool");

        match self.get(tool_name).execute(arguments).await {
            Ok(result) => {
                if result.is_error {
                    tracing::info!(tool = %tool_name, "Tool returned an application error");
                }
                Ok(result)
            }
            Err(err) => match err.downcast::<ToolError>() {
                Ok(protocol_error) => Err(protocol_error),
                Err(err) => {
                    tracing::warn!(tool = %tool_name, error = %format!("{err:#}"), "Tool execution failed");
                    Ok(ToolExecutionError {
                        tool: tool_name,
                        message: format!("{err:#}"),
                    }
                    .into_result())
                }
            },
        }
    }
}

// Helper functions for creating tool schemas

pub fn json_schema_object(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_string(description: &str) -> Value {
    serde_json::json!({
        "type": "string",
        "description": description
    })
}

pub fn json_schema_number(description: &str) -> Value {
    serde_json::json!({
        "type": "number",
        "description": description
    })
}

pub fn json_schema_boolean(description: &str) -> Value {
    serde_json::json!({
        "type": "boolean",
        "description": description
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::ToolContent;
    use serde_json::json;

    /// Echoes its arguments back as a JSON text block
    pub(crate) struct EchoTool {
        pub name: ToolName,
    }

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: self.name.as_str().to_string(),
                description: format!("Echo tool standing in for {}", self.name),
                input_schema: json_schema_object(json!({}), vec![]),
            }
        }

        async fn execute(&self, arguments: Map<String, Value>) -> Result<CallToolResult> {
            if arguments.contains_key("explode") {
                anyhow::bail!("remote source unavailable");
            }
            if arguments.contains_key("reject") {
                return Err(ToolError::InvalidArguments {
                    tool: self.name.as_str().to_string(),
                    message: "reject requested".to_string(),
                }
                .into());
            }
            if arguments.contains_key("empty") {
                return Ok(CallToolResult::failure(vec![ToolContent::text("no results")]));
            }
            Ok(CallToolResult::json(
                &json!({"tool": self.name.as_str(), "arguments": arguments}),
                false,
            ))
        }
    }

    pub(crate) fn echo_registry() -> ToolRegistry {
        ToolRegistry::new(
            Arc::new(EchoTool {
                name: ToolName::AirbnbSearch,
            }),
            Arc::new(EchoTool {
                name: ToolName::AirbnbListingDetails,
            }),
        )
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn text_of(result: &CallToolResult) -> Value {
        let ToolContent::Text { text } = &result.content[0];
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_tool_name_round_trip() {
        assert_eq!("airbnb_search".parse::<ToolName>().unwrap(), ToolName::AirbnbSearch);
        assert_eq!(
            "airbnb_listing_details".parse::<ToolName>().unwrap(),
            ToolName::AirbnbListingDetails
        );
        assert_eq!(
            "web_fetch".parse::<ToolName>().unwrap_err(),
            ToolError::UnknownTool("web_fetch".to_string())
        );
    }

    #[test]
    fn test_list_is_in_declaration_order() {
        let registry = echo_registry();
        let names: Vec<_> = registry.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["airbnb_search", "airbnb_listing_details"]);
    }

    #[tokio::test]
    async fn test_invoke_known_tool() {
        let registry = echo_registry();
        let result = registry
            .invoke("airbnb_search", args(json!({"location": "Kyoto"})))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(text_of(&result)["arguments"]["location"], json!("Kyoto"));
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let registry = echo_registry();
        let err = registry.invoke("nope", Map::new()).await.unwrap_err();
        assert_eq!(err, ToolError::UnknownTool("nope".to_string()));
        assert_eq!(err.to_rpc_error().code, -32601);
    }

    #[tokio::test]
    async fn test_collaborator_failure_is_wrapped() {
        let registry = echo_registry();
        let result = registry
            .invoke("airbnb_search", args(json!({"explode": true})))
            .await
            .unwrap();
        assert!(result.is_error);
        let body = text_of(&result);
        assert!(body["error"].as_str().unwrap().contains("remote source unavailable"));
    }

    #[tokio::test]
    async fn test_protocol_error_is_propagated() {
        let registry = echo_registry();
        let err = registry
            .invoke("airbnb_listing_details", args(json!({"reject": true})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        assert_eq!(err.to_rpc_error().code, -32602);
    }

    #[tokio::test]
    async fn test_application_error_passes_through() {
        let registry = echo_registry();
        let result = registry
            .invoke("airbnb_search", args(json!({"empty": true})))
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.content, vec![ToolContent::text("no results")]);
    }
}
