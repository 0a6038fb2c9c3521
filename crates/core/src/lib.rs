// Shared building blocks for the Airbnb MCP gateway: configuration loading
// and the access token store.

pub mod auth;
pub mod config;

pub use auth::{AuthError, AuthenticatedIdentity, TokenStore};
pub use config::{GatewayConfig, LogFormat, TransportMode};
