use airbnb_mcp::tools::ToolRegistry;
use airbnb_mcp::Dispatcher;
use airbnb_mcp_core::auth::TokenStore;
use axum::http::{header, HeaderValue, Method};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Application state shared across handlers. Everything in it is read-only
/// after startup.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub tokens: Arc<TokenStore>,
}

impl AppState {
    pub fn new(registry: Arc<ToolRegistry>, tokens: Arc<TokenStore>) -> Self {
        Self {
            dispatcher: Dispatcher::new(registry),
            tokens,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }
}

/// Cross-origin policy from the configured origin list. `*` allows any
/// origin; an empty list allows none.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if allowed_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();

    tracing::info!(count = origins.len(), "Configured allowed origins");
    layer.allow_origin(AllowOrigin::list(origins))
}
