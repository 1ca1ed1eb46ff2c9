//! The agent turn state machine.

use crawlpilot_config::AgentConfig;
use crawlpilot_core::{
    BusyPolicy, LimitPolicy, Message, ModelClient, ModelRequest, ModelResponse, SessionId,
    ToolCall, ToolResult,
};
use crawlpilot_session::ConversationStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::dispatcher::ToolDispatcher;
use crate::error::AgentError;

/// Reply used when the model finishes with no text.
pub const EMPTY_REPLY_NOTICE: &str = "I've completed the task, but had nothing further to add.";

/// Reply used when the iteration bound is hit before the agent said anything.
pub const LIMIT_NOTICE: &str = "I wasn't able to finish within the allowed number of steps. \
Here is where I got to; try asking a narrower question.";

/// Per-turn limits and policies.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_iterations: u32,
    pub turn_timeout: Duration,
    pub limit_policy: LimitPolicy,
    pub busy_policy: BusyPolicy,
    pub max_input_chars: usize,
    pub system_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for AgentSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            turn_timeout: Duration::from_secs(config.turn_timeout_secs),
            limit_policy: config.on_iteration_limit,
            busy_policy: config.busy_policy,
            max_input_chars: config.max_input_chars,
            system_prompt: Some(config.system_prompt.clone()).filter(|p| !p.trim().is_empty()),
        }
    }
}

/// The outcome of a successful turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalAnswer {
    pub reply: String,
    /// Every dispatched tool name, in request order, duplicates kept
    pub tools_used: Vec<String>,
    /// Every dispatched call with its assigned id, in request order
    pub tool_calls: Vec<ToolCall>,
    /// One result per entry of `tool_calls`, same order
    pub tool_results: Vec<ToolResult>,
    /// Model calls made during the turn
    pub iterations: u32,
    /// The iteration bound was hit before a final answer
    pub truncated: bool,
}

/// Orchestrates model calls and tool batches against one session's history.
///
/// Each call to [`AgentLoop::run`] is one turn:
///
/// 1. take the session's turn (per busy policy) and append the user message
/// 2. ask the model for its next step, with the full history and tool list
/// 3. on a final answer, append it and return
/// 4. on tool calls, run them as one batch, append the request and its
///    results in call order, and go back to 2
///
/// The loop stops after `max_iterations` model calls. Dropping the returned
/// future cancels in-flight model and tool calls; messages already
/// appended stay, and the session goes back to idle.
pub struct AgentLoop {
    model: Arc<dyn ModelClient>,
    dispatcher: Arc<ToolDispatcher>,
    store: Arc<ConversationStore>,
    settings: AgentSettings,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn ModelClient>,
        dispatcher: Arc<ToolDispatcher>,
        store: Arc<ConversationStore>,
    ) -> Self {
        Self {
            model,
            dispatcher,
            store,
            settings: AgentSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Run one turn on `session_id` with the given user input.
    pub async fn run(
        &self,
        session_id: &SessionId,
        user_message: &str,
    ) -> Result<FinalAnswer, AgentError> {
        let _turn = self
            .store
            .begin_turn(session_id, self.settings.busy_policy)
            .await?;

        info!(session_id = %session_id, model = %self.model.name(), "Starting turn");

        match tokio::time::timeout(self.settings.turn_timeout, self.run_turn(session_id, user_message))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    session_id = %session_id,
                    timeout_secs = self.settings.turn_timeout.as_secs(),
                    "Turn timed out"
                );
                Err(AgentError::TurnTimeout {
                    secs: self.settings.turn_timeout.as_secs(),
                })
            }
        }
    }

    async fn run_turn(
        &self,
        session_id: &SessionId,
        user_message: &str,
    ) -> Result<FinalAnswer, AgentError> {
        let input = self.truncate_input(session_id, user_message);
        self.store.append(session_id, Message::user(input))?;

        let tools = self.dispatcher.registry().list();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut tool_results: Vec<ToolResult> = Vec::new();
        let mut last_agent_text: Option<String> = None;

        for iteration in 1..=self.settings.max_iterations {
            debug!(session_id = %session_id, iteration, "Agent loop iteration");

            let request = ModelRequest {
                system_prompt: self.settings.system_prompt.clone(),
                messages: self.store.history(session_id)?,
                tools: tools.clone(),
            };

            match self.model.generate(request).await? {
                ModelResponse::Final { content } => {
                    let reply = if content.trim().is_empty() {
                        EMPTY_REPLY_NOTICE.to_string()
                    } else {
                        content
                    };
                    self.store.append(session_id, Message::agent(reply.clone()))?;

                    info!(
                        session_id = %session_id,
                        iterations = iteration,
                        tools_used = tool_calls.len(),
                        "Turn complete"
                    );
                    return Ok(FinalAnswer {
                        reply,
                        tools_used: tool_names(&tool_calls),
                        tool_calls,
                        tool_results,
                        iterations: iteration,
                        truncated: false,
                    });
                }
                ModelResponse::ToolCalls { content, calls } => {
                    let calls = self.dispatcher.assign_ids(calls);
                    let results = self.dispatcher.execute_batch(&calls).await;

                    if !content.trim().is_empty() {
                        last_agent_text = Some(content.clone());
                    }
                    let mut messages = Vec::with_capacity(results.len() + 1);
                    messages.push(Message::agent_tool_calls(content, calls.clone()));
                    messages.extend(results.iter().map(Message::tool_result));
                    self.store.append_all(session_id, messages)?;

                    tool_calls.extend(calls);
                    tool_results.extend(results);
                }
            }
        }

        let iterations = self.settings.max_iterations;
        warn!(session_id = %session_id, iterations, "Iteration limit reached without a final answer");

        match self.settings.limit_policy {
            LimitPolicy::Partial => Ok(FinalAnswer {
                reply: last_agent_text.unwrap_or_else(|| LIMIT_NOTICE.to_string()),
                tools_used: tool_names(&tool_calls),
                tool_calls,
                tool_results,
                iterations,
                truncated: true,
            }),
            LimitPolicy::Fail => Err(AgentError::IterationLimitExceeded {
                iterations,
                partial: last_agent_text,
            }),
        }
    }

    fn truncate_input(&self, session_id: &SessionId, input: &str) -> String {
        let max = self.settings.max_input_chars;
        match input.char_indices().nth(max) {
            Some((cut, _)) => {
                warn!(
                    session_id = %session_id,
                    chars = input.chars().count(),
                    max,
                    "User input too long, truncating"
                );
                input[..cut].to_string()
            }
            None => input.to_string(),
        }
    }
}

fn tool_names(calls: &[ToolCall]) -> Vec<String> {
    calls.iter().map(|c| c.name.clone()).collect()
}
