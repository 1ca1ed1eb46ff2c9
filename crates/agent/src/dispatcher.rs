//! Batch execution of tool calls.
//!
//! A batch always yields one [`ToolResult`] per call, in call order, no
//! matter which call finishes first or how a call fails. Unknown tools,
//! invalid arguments, tool errors, panics and timeouts all become error
//! results; nothing escapes [`ToolDispatcher::execute_batch`].

use crawlpilot_config::ToolsConfig;
use crawlpilot_core::schema;
use crawlpilot_core::{ToolCall, ToolError, ToolRegistry, ToolResult};
use futures::{FutureExt, StreamExt, stream};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    call_timeout: Duration,
    max_concurrency: usize,
    max_output_chars: usize,
    next_id: AtomicU64,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            call_timeout: Duration::from_secs(30),
            max_concurrency: 4,
            max_output_chars: 50_000,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn from_config(registry: Arc<ToolRegistry>, config: &ToolsConfig) -> Self {
        Self::new(registry)
            .with_call_timeout(Duration::from_secs(config.call_timeout_secs))
            .with_max_concurrency(config.max_concurrency)
            .with_max_output_chars(config.max_output_chars)
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn with_max_output_chars(mut self, n: usize) -> Self {
        self.max_output_chars = n;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Give every call with an empty id a generated one (`call_<n>_<uuid>`).
    ///
    /// Duplicate ids are left alone; each call still gets its own result.
    pub fn assign_ids(&self, calls: Vec<ToolCall>) -> Vec<ToolCall> {
        calls
            .into_iter()
            .map(|mut call| {
                if call.id.trim().is_empty() {
                    let n = self.next_id.fetch_add(1, Ordering::Relaxed);
                    call.id = format!("call_{n}_{}", uuid::Uuid::new_v4().simple());
                }
                call
            })
            .collect()
    }

    /// Execute a batch. Up to `max_concurrency` calls run at once; results
    /// come back in input order.
    pub async fn execute_batch(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        if calls.is_empty() {
            return Vec::new();
        }
        info!(
            calls = calls.len(),
            tools = ?calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "Dispatching tool batch"
        );

        // Built up front: the batch future must stay `Send`.
        let pending: Vec<_> = calls.iter().map(|call| self.execute(call)).collect();
        let results: Vec<ToolResult> = stream::iter(pending)
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.is_error).count();
        if failed > 0 {
            warn!(failed, total = results.len(), "Tool batch finished with errors");
        }
        results
    }

    /// Execute one call, converting every failure into an error result.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let start = Instant::now();
        let outcome = self.run(call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                debug!(tool = %call.name, call_id = %call.id, duration_ms, bytes = output.len(), "Tool call succeeded");
                ToolResult::ok(&call.id, &call.name, self.truncate(output))
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, duration_ms, error = %e, "Tool call failed");
                ToolResult::error(&call.id, &call.name, format!("Error: {e}"))
            }
        }
    }

    async fn run(&self, call: &ToolCall) -> Result<String, ToolError> {
        let (Some(tool), Some(descriptor)) =
            (self.registry.get(&call.name), self.registry.lookup(&call.name))
        else {
            return Err(ToolError::NotFound(call.name.clone()));
        };

        schema::validate_arguments(&descriptor.parameters, &call.arguments)
            .map_err(ToolError::InvalidArguments)?;

        let guarded = AssertUnwindSafe(tool.execute(call.arguments.clone())).catch_unwind();
        match tokio::time::timeout(self.call_timeout, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => Err(ToolError::Panicked(panic_message(payload.as_ref()))),
            Err(_) => Err(ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_ms: self.call_timeout.as_millis() as u64,
            }),
        }
    }

    fn truncate(&self, output: String) -> String {
        match output.char_indices().nth(self.max_output_chars) {
            Some((cut, _)) => format!(
                "{}\n\n[... output truncated at {} characters]",
                &output[..cut],
                self.max_output_chars
            ),
            None => output,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
