//! Single-page scraping through Firecrawl's `/v1/scrape`.

use async_trait::async_trait;
use crawlpilot_core::{Tool, ToolError};
use serde_json::Value;
use std::sync::Arc;

use crate::firecrawl::{FirecrawlClient, failed};

const NAME: &str = "firecrawl_scrape";

pub struct ScrapeTool {
    client: Arc<FirecrawlClient>,
}

impl ScrapeTool {
    pub fn new(client: Arc<FirecrawlClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for ScrapeTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Fetch one web page and return its main content as markdown. \
         Use this when you already know the URL that holds the answer."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The page URL (http or https)"
                },
                "formats": {
                    "type": "array",
                    "description": "Content formats to return (default [\"markdown\"])",
                    "items": { "type": "string", "enum": ["markdown", "html", "links"] }
                },
                "onlyMainContent": {
                    "type": "boolean",
                    "description": "Strip navigation, headers and footers (default true)"
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
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "URL must start with http:// or https://".into(),
            ));
        }

        let formats = match &arguments["formats"] {
            Value::Array(f) if !f.is_empty() => Value::Array(f.clone()),
            _ => serde_json::json!(["markdown"]),
        };
        let body = serde_json::json!({
            "url": url,
            "formats": formats,
            "onlyMainContent": arguments["onlyMainContent"].as_bool().unwrap_or(true),
        });

        let response = self.client.post(NAME, "scrape", &body).await?;
        let data = &response["data"];
        if !data.is_object() {
            return Err(failed(NAME, "response has no data"));
        }
        Ok(format_page(url, data))
    }
}

fn format_page(url: &str, data: &Value) -> String {
    let title = data["metadata"]["title"].as_str().unwrap_or(url);
    let mut out = format!("# {title}\nSource: {url}\n");

    if let Some(markdown) = data["markdown"].as_str() {
        out.push('\n');
        out.push_str(markdown.trim());
        out.push('\n');
    }
    if let Some(html) = data["html"].as_str() {
        out.push_str("\n--- HTML ---\n");
        out.push_str(html.trim());
        out.push('\n');
    }
    if let Some(links) = data["links"].as_array().filter(|l| !l.is_empty()) {
        out.push_str("\n--- Links ---\n");
        for link in links.iter().filter_map(Value::as_str) {
            out.push_str(link);
            out.push('\n');
        }
    }
    out
}
