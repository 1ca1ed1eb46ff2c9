//! Shared HTTP client for the Firecrawl REST API.
//!
//! Every Firecrawl tool posts JSON to `/v1/<endpoint>` with a bearer key and
//! gets back `{"success": bool, ...}`. Failures become
//! [`ToolError::ExecutionFailed`] tagged with the calling tool's name so the
//! dispatcher can hand them to the model as error results.

use crawlpilot_config::ToolsConfig;
use crawlpilot_core::ToolError;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound for a single Firecrawl HTTP request. The dispatcher's
/// per-call timeout is normally the tighter limit.
const HTTP_TIMEOUT: Duration = Duration::from_secs(90);

pub struct FirecrawlClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
    poll_interval: Duration,
}

impl FirecrawlClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "firecrawl".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            http,
            poll_interval: Duration::from_secs(2),
        })
    }

    pub fn from_config(config: &ToolsConfig) -> Result<Self, ToolError> {
        let client = Self::new(&config.firecrawl_api_url, config.firecrawl_api_key.clone())?;
        if !client.has_key() {
            warn!("FIRECRAWL_API_KEY is not set; Firecrawl tool calls will fail");
        }
        Ok(client)
    }

    /// How often asynchronous jobs (extract) are polled.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn key(&self, tool: &str) -> Result<&str, ToolError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| failed(tool, "Firecrawl API key is not configured (set FIRECRAWL_API_KEY)"))
    }

    /// POST a JSON body to `/v1/{endpoint}`.
    pub async fn post(&self, tool: &str, endpoint: &str, body: &Value) -> Result<Value, ToolError> {
        let url = format!("{}/v1/{endpoint}", self.base_url);
        debug!(tool, %url, "Calling Firecrawl");

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.key(tool)?)
            .json(body)
            .send()
            .await
            .map_err(|e| failed(tool, format!("request failed: {e}")))?;

        Self::read(tool, response).await
    }

    /// GET `/v1/{path}`.
    pub async fn get(&self, tool: &str, path: &str) -> Result<Value, ToolError> {
        let url = format!("{}/v1/{path}", self.base_url);
        debug!(tool, %url, "Polling Firecrawl");

        let response = self
            .http
            .get(&url)
            .bearer_auth(self.key(tool)?)
            .send()
            .await
            .map_err(|e| failed(tool, format!("request failed: {e}")))?;

        Self::read(tool, response).await
    }

    async fn read(tool: &str, response: reqwest::Response) -> Result<Value, ToolError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| failed(tool, format!("failed to read response: {e}")))?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if !status.is_success() || body["success"] == Value::Bool(false) {
            let detail = body["error"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| truncate(&text, 300));
            return Err(failed(tool, format!("Firecrawl returned {status}: {detail}")));
        }
        if body.is_null() {
            return Err(failed(tool, "Firecrawl returned a non-JSON body"));
        }
        Ok(body)
    }
}

pub(crate) fn failed(tool: &str, reason: impl Into<String>) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool.to_string(),
        reason: reason.into(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &s[..i]),
        None => s.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A local stand-in for the Firecrawl API.

    use axum::Router;

    pub const TEST_KEY: &str = "fc-test";

    /// Serve `app` on an ephemeral port and return its base URL.
    pub async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    pub fn authorized(headers: &axum::http::HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("Bearer {TEST_KEY}"))
    }
}
