pub mod client;
pub mod listing;
pub mod projection;
pub mod robots;
pub mod search;
mod registry;

pub use client::AirbnbClient;
pub use listing::ListingDetailsTool;
pub use registry::{
    json_schema_boolean, json_schema_number, json_schema_object, json_schema_string, Tool,
    ToolError, ToolExecutionError, ToolName, ToolRegistry,
};
pub use robots::{RobotsPolicy, RobotsRules};
pub use search::SearchTool;

use airbnb_mcp_core::config::AirbnbSection;
use anyhow::Result;
use std::sync::Arc;

/// Build the production catalog: both Airbnb tools sharing one HTTP client
/// and one robots policy. The policy is returned so callers can prefetch.
pub fn airbnb_registry(config: &AirbnbSection) -> Result<(ToolRegistry, Arc<RobotsPolicy>)> {
    let client = Arc::new(AirbnbClient::new(config)?);
    let robots = Arc::new(RobotsPolicy::new(client.clone(), config.ignore_robots_txt));

    let registry = ToolRegistry::new(
        Arc::new(SearchTool::new(client.clone(), robots.clone())),
        Arc::new(ListingDetailsTool::new(client, robots.clone())),
    );

    Ok((registry, robots))
}

#[cfg(test)]
pub(crate) use registry::tests::echo_registry;
