// Request dispatch shared by the stdio and HTTP JSON-RPC surfaces

use crate::protocol::{
    InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, RpcMethod, ServerCapabilities, ServerInfo, ToolsCapability,
    DEFAULT_PROTOCOL_VERSION,
};
use crate::tools::ToolRegistry;
use serde_json::{json, Value};
use std::sync::Arc;

pub const SERVER_NAME: &str = "airbnb-mcp";

/// Routes decoded JSON-RPC requests to the tool registry
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Handle one request and build its response. Callers decide whether a
    /// notification's response is emitted.
    pub async fn dispatch(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let id = request.response_id();

        let method = match RpcMethod::parse(request) {
            Ok(method) => method,
            Err(error) => {
                tracing::debug!(method = %request.method, code = error.code, "Rejected request");
                return JsonRpcResponse::error(id, error);
            }
        };

        match self.handle(method).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        }
    }

    async fn handle(&self, method: RpcMethod) -> Result<Value, JsonRpcError> {
        match method {
            RpcMethod::Initialize(params) => to_value(&initialize_result(params)),
            RpcMethod::Initialized | RpcMethod::Ping => Ok(json!({})),
            RpcMethod::ListTools => to_value(&ListToolsResult {
                tools: self.registry.list(),
            }),
            RpcMethod::CallTool(params) => {
                let result = self
                    .registry
                    .invoke(&params.name, params.arguments)
                    .await
                    .map_err(|e| e.to_rpc_error())?;
                to_value(&result)
            }
        }
    }
}

fn initialize_result(params: InitializeParams) -> InitializeResult {
    if let Some(client) = &params.client_info {
        tracing::info!(client = %client.name, version = %client.version, "Client initialized");
    }

    InitializeResult {
        protocol_version: params
            .protocol_version
            .unwrap_or_else(|| DEFAULT_PROTOCOL_VERSION.to_string()),
        capabilities: ServerCapabilities {
            tools: ToolsCapability {
                list_changed: false,
            },
        },
        server_info: ServerInfo {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!(error = %e, "Failed to serialize result");
        JsonRpcError::internal_error("Internal error")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::echo_registry;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(echo_registry()))
    }

    #[tokio::test]
    async fn test_tools_list_echoes_id() {
        let dispatcher = dispatcher();
        for id in [json!(1), json!("abc-123"), json!(0)] {
            let request = JsonRpcRequest::new(id.clone(), "tools/list", None);
            let response = dispatcher.dispatch(&request).await;
            assert_eq!(response.id, id);
            assert_eq!(response.result.unwrap()["tools"].as_array().unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn test_tools_list_is_stable() {
        let dispatcher = dispatcher();
        let request = JsonRpcRequest::new(1, "tools/list", None);
        let first = serde_json::to_string(&dispatcher.dispatch(&request).await).unwrap();
        let second = serde_json::to_string(&dispatcher.dispatch(&request).await).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_method_not_found() {
        let request = JsonRpcRequest::new(5, "tools/call", Some(json!({"name": "book_flight"})));
        let response = dispatcher().dispatch(&request).await;
        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, -32601);
        assert!(error.message.contains("book_flight"));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let request = JsonRpcRequest::new(5, "prompts/list", None);
        let response = dispatcher().dispatch(&request).await;
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_tool_call_result() {
        let request = JsonRpcRequest::new(
            9,
            "tools/call",
            Some(json!({"name": "airbnb_listing_details", "arguments": {"id": "42"}})),
        );
        let response = dispatcher().dispatch(&request).await;
        let result = response.result.unwrap();
        assert_eq!(result["isError"], json!(false));
        assert_eq!(result["content"][0]["type"], json!("text"));
    }

    #[tokio::test]
    async fn test_application_error_stays_a_result() {
        let request = JsonRpcRequest::new(
            9,
            "tools/call",
            Some(json!({"name": "airbnb_search", "arguments": {"empty": true}})),
        );
        let response = dispatcher().dispatch(&request).await;
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["isError"], json!(true));
    }

    #[tokio::test]
    async fn test_initialize_and_ping() {
        let request = JsonRpcRequest::new(
            1,
            "initialize",
            Some(json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "inspector", "version": "1.0"}
            })),
        );
        let result = dispatcher().dispatch(&request).await.result.unwrap();
        assert_eq!(result["protocolVersion"], json!("2025-03-26"));
        assert_eq!(result["serverInfo"]["name"], json!(SERVER_NAME));
        assert_eq!(result["capabilities"]["tools"]["listChanged"], json!(false));

        let ping = JsonRpcRequest::new(2, "ping", None);
        assert_eq!(dispatcher().dispatch(&ping).await.result.unwrap(), json!({}));
    }
}
