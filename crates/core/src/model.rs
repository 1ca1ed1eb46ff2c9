//! The ModelClient trait: the abstraction over language-model backends.
//!
//! A ModelClient receives the session history plus the registered tool
//! descriptors and answers with either a final answer or a batch of
//! tool calls. How the model reasons is opaque to the rest of the system.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::message::Message;
use crate::tool::{ToolCall, ToolDescriptor};

/// One generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Instructions prepended to the conversation (never stored in history)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// The session history, oldest first
    pub messages: Vec<Message>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,
}

/// What the model decided to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelResponse {
    /// A final answer; terminates the turn.
    Final { content: String },

    /// One or more tool requests, with any accompanying text.
    ToolCalls {
        #[serde(default)]
        content: String,
        calls: Vec<ToolCall>,
    },
}

impl ModelResponse {
    /// Build a response from raw parts: no calls means a final answer.
    pub fn from_parts(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        if calls.is_empty() {
            Self::Final {
                content: content.into(),
            }
        } else {
            Self::ToolCalls {
                content: content.into(),
                calls,
            }
        }
    }

    /// The terminal-answer predicate of the agent loop.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }
}

/// The core ModelClient trait.
///
/// The agent loop calls `generate()` without knowing which backend is in
/// use. Implementations map transport failures onto [`ModelError`] so the
/// retry layer can tell transient from permanent failures.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this client (e.g., "gemini").
    fn name(&self) -> &str;

    /// Ask the model for its next step.
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}
