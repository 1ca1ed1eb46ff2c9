//! Terminal failures of an agent turn.
//!
//! Tool failures never show up here: the dispatcher turns them into error
//! results the model sees. Only model, session and turn-level limits end a
//! turn with an error.

use crawlpilot_core::{ModelError, SessionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("No final answer after {iterations} model calls")]
    IterationLimitExceeded {
        iterations: u32,
        /// The last text the agent produced during the turn, if any
        partial: Option<String>,
    },

    #[error("Turn timed out after {secs}s")]
    TurnTimeout { secs: u64 },
}
