//! Turn policies shared by configuration, the session store and the agent loop.

use serde::{Deserialize, Serialize};

/// What happens when a turn is started on a session that is already running one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// Fail fast with `SessionError::Busy` (default)
    #[default]
    Reject,
    /// Wait until the running turn finishes
    Queue,
}

/// How a turn that hits the iteration bound is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPolicy {
    /// Return the last agent text as a truncated answer (default)
    #[default]
    Partial,
    /// Return `IterationLimitExceeded` as an error
    Fail,
}
