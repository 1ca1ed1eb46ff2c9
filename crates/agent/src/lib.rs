//! The agent orchestration loop: the heart of CrawlPilot.
//!
//! A turn follows a **Think → Act → Observe** cycle:
//!
//! 1. **Receive** a user message for a session
//! 2. **Ask the model** with the session history and the tool list
//! 3. **If tool calls**: run them as one batch through the [`ToolDispatcher`],
//!    append the results, loop back to step 2
//! 4. **If a final answer**: append it and return it
//!
//! The loop ends on a final answer, on the iteration bound, or on the
//! turn timeout.

pub mod dispatcher;
pub mod error;
pub mod loop_runner;

#[cfg(test)]
mod test_helpers;

pub use dispatcher::ToolDispatcher;
pub use error::AgentError;
pub use loop_runner::{AgentLoop, AgentSettings, FinalAnswer};
