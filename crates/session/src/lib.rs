//! Conversation sessions for CrawlPilot.
//!
//! Sessions live in process memory only. The [`ConversationStore`] is the
//! single owner of every session's history; nothing else keeps a copy.

pub mod store;

pub use store::{ConversationStore, SessionSummary, TurnGuard};
