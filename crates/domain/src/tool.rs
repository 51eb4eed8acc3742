use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;

use crate::capability::ToolCapability;
use crate::error::Result;

/// Per-invocation context the registry filters availability against, and
/// that `Tool::execute` receives. Built once per Agent Loop turn from the
/// caller's configured collaborators and the current resource projection.
#[derive(Clone)]
pub struct ToolContext {
    pub project_id: String,
    pub thread_id: String,
    pub job_id: String,
    /// Capabilities actually wired up for this invocation (retriever
    /// configured, web-search key present, …).
    pub available: HashSet<ToolCapability>,
    /// Flat resource projection for list_resources/get_resource_info.
    pub resources: Vec<crate::model::Resource>,
}

impl ToolContext {
    pub fn has(&self, cap: ToolCapability) -> bool {
        self.available.contains(&cap)
    }
}

/// Result of one tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    /// Fed back to the model as the tool-result message content.
    pub content: String,
    pub success: bool,
    /// Consumed by the event layer (e.g. `{found, query, sources}`);
    /// opaque to the Agent Loop itself.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            success: true,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn failed(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            success: false,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Standard response for a tool whose capability isn't wired up:
    /// a clean, model-recoverable failure rather than a missing schema.
    pub fn capability_unavailable(tool_name: &str) -> Self {
        Self {
            content: format!("{tool_name} is currently unavailable"),
            success: false,
            metadata: serde_json::json!({ "reason": "capability_unavailable" }),
        }
    }
}

/// A named capability the model may invoke. Implementors are kept in a
/// registry keyed by `name()`; availability is a pure predicate over the
/// context and MUST NOT mutate registry state.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema for the tool's parameters, validated against the
    /// model's tool-call payload before `execute` is invoked.
    fn input_schema(&self) -> serde_json::Value;

    /// Capabilities this tool requires to be usable.
    fn requires(&self) -> &'static [ToolCapability];

    /// True if every required capability is present in `ctx`.
    fn is_available(&self, ctx: &ToolContext) -> bool {
        self.requires().iter().all(|cap| ctx.has(*cap))
    }

    async fn execute(&self, params: serde_json::Value, ctx: &ToolContext) -> Result<ToolResult>;
}
