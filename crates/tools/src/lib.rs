//! Built-in tool implementations for CrawlPilot.
//!
//! Tools give the agent its reach into the web, all backed by the
//! Firecrawl REST API: search, scrape a page, map a site, and extract
//! structured data.

pub mod extract;
pub mod firecrawl;
pub mod map;
pub mod scrape;
pub mod search;

pub use firecrawl::FirecrawlClient;

use crawlpilot_config::ToolsConfig;
use crawlpilot_core::{Tool, ToolError, ToolRegistry};
use std::sync::Arc;
use tracing::{info, warn};

/// Names of every built-in tool, in registration order.
pub const BUILTIN_TOOLS: &[&str] = &[
    "firecrawl_search",
    "firecrawl_scrape",
    "firecrawl_map",
    "firecrawl_extract",
];

/// Create the tool registry described by the configuration.
///
/// An empty `enabled` list registers every built-in tool.
pub fn default_registry(config: &ToolsConfig) -> Result<ToolRegistry, ToolError> {
    let client = Arc::new(FirecrawlClient::from_config(config)?);
    registry_with_client(client, &config.enabled)
}

/// Build the registry around an existing Firecrawl client.
pub fn registry_with_client(
    client: Arc<FirecrawlClient>,
    enabled: &[String],
) -> Result<ToolRegistry, ToolError> {
    for name in enabled {
        if !BUILTIN_TOOLS.contains(&name.as_str()) {
            warn!(tool = %name, "Unknown tool in tools.enabled, ignoring");
        }
    }

    let all: Vec<Box<dyn Tool>> = vec![
        Box::new(search::SearchTool::new(client.clone())),
        Box::new(scrape::ScrapeTool::new(client.clone())),
        Box::new(map::MapTool::new(client.clone())),
        Box::new(extract::ExtractTool::new(client)),
    ];

    let mut registry = ToolRegistry::new();
    for tool in all {
        if enabled.is_empty() || enabled.iter().any(|n| n == tool.name()) {
            registry.register(tool)?;
        }
    }

    info!(tools = ?registry.names(), "Tool registry ready");
    Ok(registry)
}
