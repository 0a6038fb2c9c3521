// MCP protocol types and the JSON-RPC 2.0 envelope codec

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision advertised when the client does not ask for one
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// `None` only when the member is absent; `"id": null` is `Some(Value::Null)`.
    #[serde(default, deserialize_with = "present_value", skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// Requests without an `id` member are notifications and never get a
    /// response. An explicit `null` id is still answered.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Id to echo in the response; `null` when the request carried none.
    pub fn response_id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }
}

/// JSON-RPC 2.0 Response. Exactly one of `result` / `error` is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// The closed set of JSON-RPC error codes this server emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, "Parse error").with_data(Value::String(detail.into()))
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MethodNotFound, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A payload that could not be turned into a request. `id` is recovered
/// from the payload when possible so the error response still correlates.
#[derive(Debug, Clone)]
pub struct DecodeError {
    pub id: Value,
    pub error: JsonRpcError,
}

impl DecodeError {
    pub fn into_response(self) -> JsonRpcResponse {
        JsonRpcResponse::error(self.id, self.error)
    }
}

/// Decode one JSON-RPC request from raw bytes.
pub fn decode(bytes: &[u8]) -> Result<JsonRpcRequest, DecodeError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| DecodeError {
        id: Value::Null,
        error: JsonRpcError::parse_error(e.to_string()),
    })?;

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let invalid = |message: &str| DecodeError {
        id: id.clone(),
        error: JsonRpcError::invalid_request(message),
    };

    let object = value
        .as_object()
        .ok_or_else(|| invalid("Request must be a JSON object"))?;

    match object.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        _ => return Err(invalid("Unsupported or missing jsonrpc version, expected \"2.0\"")),
    }

    match object.get("id") {
        None | Some(Value::String(_)) | Some(Value::Number(_)) | Some(Value::Null) => {}
        Some(_) => return Err(invalid("Request id must be a string or number")),
    }

    if !matches!(object.get("method"), Some(Value::String(_))) {
        return Err(invalid("Request method must be a string"));
    }

    serde_json::from_value(value.clone()).map_err(|e| invalid(&e.to_string()))
}

/// Encode a response as a single line of JSON.
pub fn encode(response: &JsonRpcResponse) -> serde_json::Result<String> {
    serde_json::to_string(response)
}

/// Methods understood at the protocol layer
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMethod {
    Initialize(InitializeParams),
    Initialized,
    Ping,
    ListTools,
    CallTool(CallToolParams),
}

impl RpcMethod {
    /// Classify a request and validate its params.
    pub fn parse(request: &JsonRpcRequest) -> Result<Self, JsonRpcError> {
        match request.method.as_str() {
            "initialize" => {
                let params = match &request.params {
                    Some(params) => serde_json::from_value(params.clone())
                        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid initialize params: {e}")))?,
                    None => InitializeParams::default(),
                };
                Ok(Self::Initialize(params))
            }
            "notifications/initialized" => Ok(Self::Initialized),
            "ping" => Ok(Self::Ping),
            "tools/list" => Ok(Self::ListTools),
            "tools/call" => CallToolParams::from_params(request.params.as_ref()).map(Self::CallTool),
            other => Err(JsonRpcError::method_not_found(format!("Method not found: {other}"))),
        }
    }
}

// MCP-specific protocol messages

/// Tool definition for MCP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// List tools response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolSchema>,
}

/// Normalized tool invocation shared by JSON-RPC and REST callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl CallToolParams {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Extract `{name, arguments}` from a params object. A missing or empty
    /// name is `InvalidParams`; absent arguments default to `{}`.
    pub fn from_params(params: Option<&Value>) -> Result<Self, JsonRpcError> {
        let object = match params {
            Some(Value::Object(object)) => object,
            Some(Value::Null) | None => return Err(JsonRpcError::invalid_params("Tool name is required")),
            Some(_) => return Err(JsonRpcError::invalid_params("params must be an object")),
        };

        let name = match object.get("name") {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            Some(Value::String(_)) | Some(Value::Null) | None => {
                return Err(JsonRpcError::invalid_params("Tool name is required"))
            }
            Some(_) => return Err(JsonRpcError::invalid_params("Tool name must be a string")),
        };

        let arguments = match object.get("arguments") {
            Some(Value::Object(arguments)) => arguments.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => return Err(JsonRpcError::invalid_params("arguments must be an object")),
        };

        Ok(Self { name, arguments })
    }
}

/// Call tool response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn success(content: Vec<ToolContent>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn failure(content: Vec<ToolContent>) -> Self {
        Self {
            content,
            is_error: true,
        }
    }

    /// Single pretty-printed JSON text block
    pub fn json(value: &Value, is_error: bool) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self {
            content: vec![ToolContent::text(text)],
            is_error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Initialize request params
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion", default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(rename = "clientInfo", default)]
    pub client_info: Option<ClientInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Initialize response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}
