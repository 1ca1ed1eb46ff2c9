//! Site mapping through Firecrawl's `/v1/map`.

use async_trait::async_trait;
use crawlpilot_core::{Tool, ToolError};
use serde_json::Value;
use std::sync::Arc;

use crate::firecrawl::FirecrawlClient;

const NAME: &str = "firecrawl_map";

pub struct MapTool {
    client: Arc<FirecrawlClient>,
}

impl MapTool {
    pub fn new(client: Arc<FirecrawlClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for MapTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "List the URLs of a website, optionally filtered by a search term. \
         Use this to find the right page on a site before scraping it."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The site's base URL"
                },
                "search": {
                    "type": "string",
                    "description": "Only return URLs related to this term"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of URLs (default 100)"
                }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let url = arguments["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;
        let limit = arguments["limit"].as_u64().unwrap_or(100).clamp(1, 5_000);

        let mut body = serde_json::json!({ "url": url, "limit": limit });
        if let Some(search) = arguments["search"].as_str() {
            body["search"] = Value::from(search);
        }

        let response = self.client.post(NAME, "map", &body).await?;
        let links: Vec<&str> = response["links"]
            .as_array()
            .map(|l| l.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        if links.is_empty() {
            return Ok(format!("No pages found on {url}."));
        }
        Ok(format!("Found {} pages on {url}:\n{}", links.len(), links.join("\n")))
    }
}
