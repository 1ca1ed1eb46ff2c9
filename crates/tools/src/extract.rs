//! Structured extraction through Firecrawl's `/v1/extract`.
//!
//! Extraction runs as a job: the POST either answers with `data` directly
//! or returns a job `id` that is polled at `/v1/extract/{id}` until it
//! completes. The dispatcher's per-call timeout bounds the polling.

use async_trait::async_trait;
use crawlpilot_core::{Tool, ToolError};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::firecrawl::{FirecrawlClient, failed};

const NAME: &str = "firecrawl_extract";

pub struct ExtractTool {
    client: Arc<FirecrawlClient>,
}

impl ExtractTool {
    pub fn new(client: Arc<FirecrawlClient>) -> Self {
        Self { client }
    }

    async fn wait_for_job(&self, id: &str) -> Result<Value, ToolError> {
        loop {
            tokio::time::sleep(self.client.poll_interval()).await;
            let status = self.client.get(NAME, &format!("extract/{id}")).await?;
            match status["status"].as_str() {
                Some("completed") => return Ok(status["data"].clone()),
                Some("failed") | Some("cancelled") => {
                    let reason = status["error"].as_str().unwrap_or("extraction job failed");
                    return Err(failed(NAME, reason.to_string()));
                }
                other => debug!(job = id, status = ?other, "Extraction still running"),
            }
        }
    }
}

#[async_trait]
impl Tool for ExtractTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Extract structured data from one or more pages according to a prompt, \
         optionally shaped by a JSON schema. Returns JSON."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "urls": {
                    "type": "array",
                    "description": "Pages to extract from (wildcards like https://example.com/* allowed)",
                    "items": { "type": "string" }
                },
                "prompt": {
                    "type": "string",
                    "description": "What to extract"
                },
                "schema": {
                    "type": "object",
                    "description": "Optional JSON schema for the result"
                }
            },
            "required": ["urls", "prompt"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let urls = arguments["urls"]
            .as_array()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("'urls' must be a non-empty array".into()))?;
        let prompt = arguments["prompt"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'prompt' argument".into()))?;

        let mut body = serde_json::json!({ "urls": urls, "prompt": prompt });
        if arguments["schema"].is_object() {
            body["schema"] = arguments["schema"].clone();
        }

        let response = self.client.post(NAME, "extract", &body).await?;
        let data = match (&response["data"], response["id"].as_str()) {
            (data, _) if !data.is_null() => data.clone(),
            (_, Some(id)) => self.wait_for_job(id).await?,
            _ => return Err(failed(NAME, "response has neither data nor a job id")),
        };

        serde_json::to_string_pretty(&data).map_err(|e| failed(NAME, e.to_string()))
    }
}
