// MCP (Model Context Protocol) layer for the Airbnb gateway: the JSON-RPC
// envelope codec, the tool registry and its Airbnb tools, and the stdio
// transport runner.

pub mod dispatch;
pub mod protocol;
pub mod server;
pub mod tools;

pub use dispatch::Dispatcher;
pub use server::{McpServer, RunnerState};
