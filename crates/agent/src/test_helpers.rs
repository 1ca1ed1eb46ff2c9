//! Shared test doubles for dispatcher and loop tests.

use async_trait::async_trait;
use crawlpilot_core::{
    ModelClient, ModelError, ModelRequest, ModelResponse, Tool, ToolCall, ToolError, ToolRegistry,
};
use serde_json::{Value, json};
use std::sync::Mutex;
use std::time::Duration;

/// Returns `text` unchanged.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echoes back the input"
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }
    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        Ok(arguments["text"].as_str().unwrap_or_default().to_string())
    }
}

/// Sleeps `ms` milliseconds, then reports `"<label> after <ms>ms"`.
pub struct DelayTool;

#[async_trait]
impl Tool for DelayTool {
    fn name(&self) -> &str {
        "delay"
    }
    fn description(&self) -> &str {
        "Waits before answering"
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ms": { "type": "integer" },
                "label": { "type": "string" }
            },
            "required": ["ms"]
        })
    }
    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let ms = arguments["ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(format!("{} after {ms}ms", arguments["label"].as_str().unwrap_or("delay")))
    }
}

/// Always fails.
pub struct FailTool;

#[async_trait]
impl Tool for FailTool {
    fn name(&self) -> &str {
        "fail"
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, _arguments: Value) -> Result<String, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "fail".into(),
            reason: "upstream returned 500".into(),
        })
    }
}

/// Panics when executed.
pub struct PanicTool;

#[async_trait]
impl Tool for PanicTool {
    fn name(&self) -> &str {
        "panic"
    }
    fn description(&self) -> &str {
        "Panics"
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, _arguments: Value) -> Result<String, ToolError> {
        panic!("tool exploded");
    }
}

/// A canned `search` tool.
pub struct SearchStub;

#[async_trait]
impl Tool for SearchStub {
    fn name(&self) -> &str {
        "search"
    }
    fn description(&self) -> &str {
        "Search the web"
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }
    async fn execute(&self, _arguments: Value) -> Result<String, ToolError> {
        Ok("AirPods Pro 2: best overall".into())
    }
}

pub fn test_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(EchoTool)).unwrap();
    registry.register(Box::new(DelayTool)).unwrap();
    registry.register(Box::new(FailTool)).unwrap();
    registry.register(Box::new(PanicTool)).unwrap();
    registry.register(Box::new(SearchStub)).unwrap();
    registry
}

/// A model client that replays scripted responses and records requests.
///
/// Once the script runs out, the last response repeats.
pub struct ScriptedModel {
    script: Vec<ModelResponse>,
    delay: Duration,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<ModelResponse>) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A model that answers immediately.
    pub fn answering(text: &str) -> Self {
        Self::new(vec![final_answer(text)])
    }

    /// Wait before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let response = self
            .script
            .get(n)
            .or(self.script.last())
            .cloned()
            .ok_or_else(|| ModelError::InvalidResponse("empty script".into()))?;
        Ok(response)
    }
}

/// A model client that always fails with the given error.
pub struct FailingModel(pub ModelError);

#[async_trait]
impl ModelClient for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, ModelError> {
        Err(self.0.clone())
    }
}

pub fn final_answer(text: &str) -> ModelResponse {
    ModelResponse::Final { content: text.into() }
}

pub fn tool_calls(content: &str, calls: Vec<ToolCall>) -> ModelResponse {
    ModelResponse::ToolCalls {
        content: content.into(),
        calls,
    }
}
