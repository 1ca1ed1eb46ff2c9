//! # CrawlPilot Core
//!
//! Domain types, traits, and error definitions for the CrawlPilot agent
//! backend. This crate has **no framework dependencies**: it defines the
//! domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Each collaborator of the agent loop is a trait here. Implementations
//! live in their own crates, which keeps the dependency graph pointing
//! inward and lets tests swap in scripted stubs.

pub mod error;
pub mod message;
pub mod model;
pub mod policy;
pub mod schema;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{ModelError, SessionError, ToolError};
pub use message::{Message, Role, SessionId};
pub use model::{ModelClient, ModelRequest, ModelResponse};
pub use policy::{BusyPolicy, LimitPolicy};
pub use tool::{Tool, ToolCall, ToolDescriptor, ToolRegistry, ToolResult};
