//! Error types for the CrawlPilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

// --- Bounded context errors ---

/// Failures calling the language model.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by model provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Model client not configured: {0}")]
    NotConfigured(String),
}

impl ModelError {
    /// Whether retrying the same request may succeed.
    ///
    /// Timeouts, rate limits, network failures and 5xx responses are
    /// transient. Authentication and malformed responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::AuthenticationFailed(_) | Self::InvalidResponse(_) | Self::NotConfigured(_) => {
                false
            }
        }
    }
}

/// Failures originating inside a tool call.
///
/// These never escape the dispatcher: each one becomes an error
/// [`ToolResult`](crate::tool::ToolResult) the model can react to.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool panicked: {0}")]
    Panicked(String),

    #[error("Invalid parameter schema for {tool_name}: {reason}")]
    InvalidSchema { tool_name: String, reason: String },

    #[error("Tool already registered: {0}")]
    DuplicateName(String),
}

/// Failures addressing a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session is busy with another turn: {0}")]
    Busy(String),

    #[error("Session capacity reached ({0}) and every session is running")]
    AtCapacity(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_displays_correctly() {
        let err = ModelError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn transient_classification() {
        assert!(ModelError::Timeout("slow".into()).is_transient());
        assert!(ModelError::RateLimited { retry_after_secs: 1 }.is_transient());
        assert!(ModelError::Network("reset".into()).is_transient());
        assert!(
            ModelError::ApiError {
                status_code: 503,
                message: "unavailable".into()
            }
            .is_transient()
        );
        assert!(
            !ModelError::ApiError {
                status_code: 400,
                message: "bad request".into()
            }
            .is_transient()
        );
        assert!(!ModelError::AuthenticationFailed("bad key".into()).is_transient());
    }

    #[test]
    fn tool_timeout_mentions_duration() {
        let err = ToolError::Timeout {
            tool_name: "firecrawl_scrape".into(),
            timeout_ms: 30_000,
        };
        assert!(err.to_string().contains("firecrawl_scrape"));
        assert!(err.to_string().contains("30000ms"));
    }
}
