use crate::config::{cors_layer, AppState};
use crate::middleware::require_bearer;
use airbnb_mcp::server::shutdown_signal;
use airbnb_mcp::tools::{RobotsPolicy, ToolError, ToolRegistry};
use airbnb_mcp_core::auth::{AuthError, TokenStore};
use airbnb_mcp_core::config::GatewayConfig;
use anyhow::{Context, Result};
use axum::{
    http::{header, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

mod handlers;

/// Every route the gateway serves, reported by the 404 handler
pub const ROUTES: [&str; 6] = [
    "GET /health",
    "POST /mcp",
    "POST /api/tools/list",
    "POST /api/tools/call",
    "POST /api/airbnb/search",
    "POST /api/airbnb/listing/{id}",
];

/// Start the HTTP gateway
pub async fn serve(
    config: &GatewayConfig,
    registry: ToolRegistry,
    robots: Arc<RobotsPolicy>,
) -> Result<()> {
    let app = build_app(config, registry, &robots).await;

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("HTTP gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("HTTP gateway stopped");
    Ok(())
}

/// Load robots.txt rules, then assemble the router. A failed prefetch is
/// logged and serving continues without rules.
pub async fn build_app(config: &GatewayConfig, registry: ToolRegistry, robots: &RobotsPolicy) -> Router {
    if let Err(err) = robots.prefetch().await {
        tracing::warn!(error = %format!("{err:#}"), "robots.txt prefetch failed; continuing without rules");
    }

    let tokens = TokenStore::new(&config.auth.access_tokens);
    let state = AppState::new(Arc::new(registry), Arc::new(tokens));
    create_router(state, cors_layer(&config.cors.allowed_origins))
}

/// Build the request pipeline: public health check, bearer-protected API
/// routes and 404 fallback, then tracing, CORS and panic recovery.
pub fn create_router(state: AppState, cors: CorsLayer) -> Router {
    let protected = Router::new()
        .route("/mcp", post(handlers::rpc).fallback(not_found))
        .route("/api/tools/list", post(handlers::list_tools).fallback(not_found))
        .route("/api/tools/call", post(handlers::call_tool).fallback(not_found))
        .route("/api/airbnb/search", post(handlers::airbnb_search).fallback(not_found))
        .route(
            "/api/airbnb/listing/{id}",
            post(handlers::airbnb_listing).fallback(not_found),
        )
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health_check).fallback(not_found))
        .merge(protected)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false))
                .on_response(DefaultOnResponse::new().include_headers(false)),
        )
        .layer(cors)
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "Not found",
            "path": uri.path(),
            "availableRoutes": ROUTES,
        })),
    )
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    tracing::error!(panic = %detail, "Request handler panicked");
    internal_error_response()
}

fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal server error")),
    )
        .into_response()
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Error type for API handlers and middleware
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized(err) => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                Json(ErrorResponse::new(err.to_string())),
            )
                .into_response(),
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
            }
            Self::Tool(err) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(err.to_string()))).into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
