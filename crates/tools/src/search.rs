//! Web search through Firecrawl's `/v1/search`.

use async_trait::async_trait;
use crawlpilot_core::{Tool, ToolError};
use serde_json::Value;
use std::sync::Arc;

use crate::firecrawl::FirecrawlClient;

const NAME: &str = "firecrawl_search";

pub struct SearchTool {
    client: Arc<FirecrawlClient>,
}

impl SearchTool {
    pub fn new(client: Arc<FirecrawlClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Search the web. Returns the most relevant pages with title, URL and a short description. \
         Use this first when you don't know which page holds the answer."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results (default 5)"
                },
                "lang": {
                    "type": "string",
                    "description": "Result language code, e.g. \"en\""
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let limit = arguments["limit"].as_u64().unwrap_or(5).clamp(1, 20);

        let mut body = serde_json::json!({ "query": query, "limit": limit });
        if let Some(lang) = arguments["lang"].as_str() {
            body["lang"] = Value::from(lang);
        }

        let response = self.client.post(NAME, "search", &body).await?;
        Ok(format_results(query, &response["data"]))
    }
}

fn format_results(query: &str, data: &Value) -> String {
    let results = data.as_array().map(Vec::as_slice).unwrap_or_default();
    if results.is_empty() {
        return format!("No results found for \"{query}\".");
    }

    let mut out = format!("Search results for \"{query}\":\n");
    for (i, r) in results.iter().enumerate() {
        let title = r["title"].as_str().unwrap_or("(untitled)");
        let url = r["url"].as_str().unwrap_or("");
        out.push_str(&format!("\n{}. {title}\n   {url}\n", i + 1));
        if let Some(desc) = r["description"].as_str().filter(|d| !d.is_empty()) {
            out.push_str(&format!("   {desc}\n"));
        }
    }
    out
}
