//! The Tool trait and the registry of tools available to the agent.
//!
//! Tools are what let the agent act in the world: search the web,
//! scrape a page, map a site, extract structured data.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ToolError;
use crate::schema;

/// A request to execute a tool, as issued by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value (expected to be an object)
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// The call ID this result answers
    pub tool_call_id: String,

    /// Name of the tool that was called
    #[serde(default)]
    pub name: String,

    /// Output text, or the error description
    pub content: String,

    /// Whether the call failed
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Static declaration of a tool, sent to the model and listed over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The core Tool trait.
///
/// Each tool (firecrawl_search, firecrawl_scrape, ...) implements this
/// trait and is registered once in the [`ToolRegistry`] at startup.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "firecrawl_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError>;

    /// Convert this tool into a descriptor.
    fn to_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

struct Registered {
    descriptor: ToolDescriptor,
    tool: Box<dyn Tool>,
}

/// The table of available tools, keyed by name.
///
/// Built once at startup and then shared read-only (`Arc<ToolRegistry>`),
/// so request processing never races on it. Listing order is registration
/// order.
pub struct ToolRegistry {
    entries: Vec<Registered>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool after validating its descriptor.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let descriptor = tool.to_descriptor();

        if descriptor.name.trim().is_empty() {
            return Err(ToolError::InvalidSchema {
                tool_name: descriptor.name,
                reason: "tool name must not be empty".into(),
            });
        }
        if self.index.contains_key(&descriptor.name) {
            return Err(ToolError::DuplicateName(descriptor.name));
        }
        schema::validate_schema(&descriptor.parameters).map_err(|reason| {
            ToolError::InvalidSchema {
                tool_name: descriptor.name.clone(),
                reason,
            }
        })?;

        tracing::debug!(tool = %descriptor.name, "Registered tool");
        self.index.insert(descriptor.name.clone(), self.entries.len());
        self.entries.push(Registered { descriptor, tool });
        Ok(())
    }

    /// Look up a tool's descriptor by name.
    pub fn lookup(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.entries[i].descriptor)
    }

    /// Get a tool implementation by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.index.get(name).map(|&i| self.entries[i].tool.as_ref())
    }

    /// All descriptors, in registration order.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.entries.iter().map(|e| e.descriptor.clone()).collect()
    }

    /// List all registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.descriptor.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
