use crate::api::ApiError;
use crate::config::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

/// Raw `Authorization` header, if present and valid UTF-8
pub fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION)?.to_str().ok()
}

/// Bearer token middleware. Authenticated requests carry an
/// `AuthenticatedIdentity` extension; everything else stops here with 401.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = state
        .tokens
        .authenticate(authorization_header(request.headers()))
        .inspect_err(|err| {
            tracing::info!(
                method = %request.method(),
                path = %request.uri().path(),
                reason = %err,
                "Rejected unauthenticated request"
            );
        })?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
