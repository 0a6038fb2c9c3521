use super::{ApiError, ApiResult};
use crate::config::AppState;
use airbnb_mcp::protocol::{self, CallToolParams, CallToolResult, ListToolsResult};
use airbnb_mcp::tools::ToolName;
use airbnb_mcp_core::auth::AuthenticatedIdentity;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{Map, Value};

/// Parse a REST body into a JSON object. An empty body is `{}`.
fn parse_object(body: &[u8]) -> ApiResult<Map<String, Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(ApiError::BadRequest("Request body must be a JSON object".to_string())),
        Err(e) => Err(ApiError::BadRequest(format!("Invalid JSON body: {e}"))),
    }
}

/// JSON-RPC endpoint. Success is 200 with the envelope; any JSON-RPC error
/// is 400 with the envelope; notifications are acknowledged with 202.
pub async fn rpc(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match protocol::decode(&body) {
        Ok(request) => request,
        Err(err) => {
            tracing::info!(code = err.error.code, "Rejected malformed JSON-RPC request");
            return (StatusCode::BAD_REQUEST, Json(err.into_response())).into_response();
        }
    };

    let response = state.dispatcher.dispatch(&request).await;

    if request.is_notification() {
        return StatusCode::ACCEPTED.into_response();
    }

    let status = if response.is_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (status, Json(response)).into_response()
}

/// List tools without the JSON-RPC envelope
pub async fn list_tools(State(state): State<AppState>) -> Json<ListToolsResult> {
    Json(ListToolsResult {
        tools: state.registry().list(),
    })
}

/// Call a tool by name: body `{name, arguments}`
pub async fn call_tool(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    body: Bytes,
) -> ApiResult<Json<CallToolResult>> {
    let body = parse_object(&body)?;
    let params = CallToolParams::from_params(Some(&Value::Object(body)))
        .map_err(|e| ApiError::BadRequest(e.message))?;

    tracing::info!(tool = %params.name, caller = identity.digest_prefix(), "REST tool call");

    let result = state.registry().invoke(&params.name, params.arguments).await?;
    Ok(Json(result))
}

/// Search alias: the whole body is the tool arguments
pub async fn airbnb_search(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<CallToolResult>> {
    let arguments = parse_object(&body)?;
    let result = state
        .registry()
        .invoke(ToolName::AirbnbSearch.as_str(), arguments)
        .await?;
    Ok(Json(result))
}

/// Listing details alias. The path id always wins over an `id` in the body.
pub async fn airbnb_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<CallToolResult>> {
    let mut arguments = parse_object(&body)?;

    if let Some(body_id) = arguments.get("id") {
        let body_id = match body_id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if body_id != id {
            tracing::warn!(
                path_id = %id,
                body_id = %body_id,
                "Listing id in body differs from path; using path id"
            );
        }
    }

    arguments.insert("id".to_string(), Value::String(id));

    let result = state
        .registry()
        .invoke(ToolName::AirbnbListingDetails.as_str(), arguments)
        .await?;
    Ok(Json(result))
}
