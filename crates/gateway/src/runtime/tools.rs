//! Tool Registry + Executor.
//!
//! The registry holds the built-in tool set and filters it against a
//! per-invocation [`ToolContext`]; the executor wraps a dispatch in the
//! `tool_call`/`tool_result` event pair the Agent Loop mirrors to the bus.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use sa_domain::capability::ToolCapability;
use sa_domain::config::ToolsConfig;
use sa_domain::error::{Error, Result};
use sa_domain::job_event::JobEvent;
use sa_domain::message::ToolCall;
use sa_domain::model::{ResourceStatus, ResourceType};
use sa_domain::tool::{Tool, ToolContext, ToolResult};
use sa_threads::FindingStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// External collaborator traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// None of these has a concrete implementation in this workspace — wiring a
// retriever, web-search provider, sandbox runtime, or vision model is out
// of scope here. A tool built against one of these reports
// `capability_unavailable` until a caller supplies a real implementation.

#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn search(&self, project_id: &str, query: &str) -> Result<Vec<Value>>;
}

#[async_trait]
pub trait WebSearchClient: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Value>>;
}

#[async_trait]
pub trait DataSandboxRunner: Send + Sync {
    async fn run(&self, resource_id: &str, code: &str, row_cap: usize) -> Result<Value>;
}

#[async_trait]
pub trait VisionImageClient: Send + Sync {
    async fn describe(&self, resource_id: &str, prompt: &str) -> Result<String>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Built-in tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ListResourcesTool;

#[async_trait]
impl Tool for ListResourcesTool {
    fn name(&self) -> &'static str {
        "list_resources"
    }
    fn description(&self) -> &'static str {
        "Enumerate resources attached to this project, optionally filtered by type or status."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "kind": {"type": "string", "description": "Filter by resource type"},
                "status": {"type": "string", "description": "Filter by resource status"},
            },
        })
    }
    fn requires(&self) -> &'static [ToolCapability] {
        &[]
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let kind: Option<ResourceType> = params
            .get("kind")
            .and_then(|v| v.as_str())
            .and_then(|s| serde_json::from_value(json!(s)).ok());
        let status: Option<ResourceStatus> = params
            .get("status")
            .and_then(|v| v.as_str())
            .and_then(|s| serde_json::from_value(json!(s)).ok());

        let matches: Vec<_> = ctx
            .resources
            .iter()
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .filter(|r| status.map_or(true, |s| r.status == s))
            .collect();

        let content = serde_json::to_string(&matches).unwrap_or_else(|_| "[]".into());
        Ok(ToolResult::ok(content))
    }
}

struct GetResourceInfoTool;

#[async_trait]
impl Tool for GetResourceInfoTool {
    fn name(&self) -> &'static str {
        "get_resource_info"
    }
    fn description(&self) -> &'static str {
        "Return the detail projection for a single named resource."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"resource_id": {"type": "string"}},
            "required": ["resource_id"],
        })
    }
    fn requires(&self) -> &'static [ToolCapability] {
        &[]
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let Some(resource_id) = params.get("resource_id").and_then(|v| v.as_str()) else {
            return Ok(ToolResult::failed("resource_id is required"));
        };
        match ctx.resources.iter().find(|r| r.id == resource_id || r.name == resource_id) {
            Some(resource) => {
                let content = serde_json::to_string(resource).unwrap_or_default();
                Ok(ToolResult::ok(content))
            }
            None => Ok(ToolResult::failed(format!("no resource matching {resource_id}"))),
        }
    }
}

struct ReadResourceTool;

#[async_trait]
impl Tool for ReadResourceTool {
    fn name(&self) -> &'static str {
        "read_resource"
    }
    fn description(&self) -> &'static str {
        "Read the first N characters of a resource's stored content."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "resource_id": {"type": "string"},
                "max_chars": {"type": "integer", "default": 4000},
            },
            "required": ["resource_id"],
        })
    }
    fn requires(&self) -> &'static [ToolCapability] {
        &[]
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let Some(resource_id) = params.get("resource_id").and_then(|v| v.as_str()) else {
            return Ok(ToolResult::failed("resource_id is required"));
        };
        let max_chars = params.get("max_chars").and_then(|v| v.as_u64()).unwrap_or(4000) as usize;

        let Some(resource) = ctx.resources.iter().find(|r| r.id == resource_id || r.name == resource_id) else {
            return Ok(ToolResult::failed(format!("no resource matching {resource_id}")));
        };
        let Some(path) = &resource.file_path else {
            return Ok(ToolResult::failed(format!("{resource_id} has no stored content")));
        };

        match std::fs::read_to_string(path) {
            Ok(text) => {
                let preview: String = text.chars().take(max_chars).collect();
                Ok(ToolResult::ok(preview))
            }
            Err(e) => Ok(ToolResult::failed(format!("could not read {resource_id}: {e}"))),
        }
    }
}

struct SearchDocumentsTool {
    retriever: Option<Arc<dyn DocumentRetriever>>,
}

#[async_trait]
impl Tool for SearchDocumentsTool {
    fn name(&self) -> &'static str {
        "search_documents"
    }
    fn description(&self) -> &'static str {
        "Semantic retrieval across the project's indexed documents. Returns matching passages with source metadata."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"],
        })
    }
    fn requires(&self) -> &'static [ToolCapability] {
        &[ToolCapability::Retriever]
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let Some(retriever) = &self.retriever else {
            return Ok(ToolResult::capability_unavailable(self.name()));
        };
        let query = params.get("query").and_then(|v| v.as_str()).unwrap_or_default();
        let sources = retriever.search(&ctx.project_id, query).await?;
        let content = serde_json::to_string(&sources).unwrap_or_else(|_| "[]".into());
        Ok(ToolResult::ok(content).with_metadata(json!({ "sources": sources })))
    }
}

struct SearchWebTool {
    client: Option<Arc<dyn WebSearchClient>>,
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &'static str {
        "search_web"
    }
    fn description(&self) -> &'static str {
        "Search the public web for information not covered by the project's own documents."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"],
        })
    }
    fn requires(&self) -> &'static [ToolCapability] {
        &[ToolCapability::WebSearch]
    }
    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let Some(client) = &self.client else {
            return Ok(ToolResult::capability_unavailable(self.name()));
        };
        let query = params.get("query").and_then(|v| v.as_str()).unwrap_or_default();
        let results = client.search(query).await?;
        let content = serde_json::to_string(&results).unwrap_or_else(|_| "[]".into());
        Ok(ToolResult::ok(content))
    }
}

struct AnalyzeDataTool {
    runner: Option<Arc<dyn DataSandboxRunner>>,
    denylist: Vec<Regex>,
    row_cap: usize,
}

#[async_trait]
impl Tool for AnalyzeDataTool {
    fn name(&self) -> &'static str {
        "analyze_data"
    }
    fn description(&self) -> &'static str {
        "Run a sandboxed tabular query against a data resource (e.g. a CSV) and return the result rows."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "resource_id": {"type": "string"},
                "code": {"type": "string", "description": "Restricted data-query expression"},
            },
            "required": ["resource_id", "code"],
        })
    }
    fn requires(&self) -> &'static [ToolCapability] {
        &[ToolCapability::DataSandbox]
    }
    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let Some(runner) = &self.runner else {
            return Ok(ToolResult::capability_unavailable(self.name()));
        };
        let resource_id = params.get("resource_id").and_then(|v| v.as_str()).unwrap_or_default();
        let code = params.get("code").and_then(|v| v.as_str()).unwrap_or_default();

        if let Some(pattern) = self.denylist.iter().find(|re| re.is_match(code)) {
            tracing::warn!(resource_id, pattern = pattern.as_str(), "analyze_data denylist hit");
            return Ok(ToolResult::failed("unsafe_operation").with_metadata(json!({ "reason": "unsafe_operation" })));
        }

        let result = runner.run(resource_id, code, self.row_cap).await?;
        Ok(ToolResult::ok(result.to_string()).with_metadata(result))
    }
}

struct ViewImageTool {
    client: Option<Arc<dyn VisionImageClient>>,
}

#[async_trait]
impl Tool for ViewImageTool {
    fn name(&self) -> &'static str {
        "view_image"
    }
    fn description(&self) -> &'static str {
        "Ask a vision-capable model to describe or answer a question about an image resource."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "resource_id": {"type": "string"},
                "prompt": {"type": "string"},
            },
            "required": ["resource_id"],
        })
    }
    fn requires(&self) -> &'static [ToolCapability] {
        &[ToolCapability::VisionClient]
    }
    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let Some(client) = &self.client else {
            return Ok(ToolResult::capability_unavailable(self.name()));
        };
        let resource_id = params.get("resource_id").and_then(|v| v.as_str()).unwrap_or_default();
        let prompt = params.get("prompt").and_then(|v| v.as_str()).unwrap_or("Describe this image.");
        let description = client.describe(resource_id, prompt).await?;
        Ok(ToolResult::ok(description))
    }
}

struct SaveFindingTool {
    findings: Arc<FindingStore>,
}

#[async_trait]
impl Tool for SaveFindingTool {
    fn name(&self) -> &'static str {
        "save_finding"
    }
    fn description(&self) -> &'static str {
        "Persist a noteworthy excerpt as a finding attached to this thread."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"content": {"type": "string"}},
            "required": ["content"],
        })
    }
    fn requires(&self) -> &'static [ToolCapability] {
        &[]
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let Some(content) = params.get("content").and_then(|v| v.as_str()) else {
            return Ok(ToolResult::failed("content is required"));
        };
        let finding = self
            .findings
            .append(&ctx.project_id, &ctx.thread_id, &ctx.job_id, content.to_owned())?;
        Ok(ToolResult::ok(format!("saved finding {}", finding.id)).with_metadata(json!({
            "saved": true,
            "finding_id": finding.id,
            "finding_content": finding.content,
        })))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Builds the full built-in set. External collaborators default to
    /// unwired; call [`ToolRegistry::with_retriever`] etc. to attach one.
    pub fn new(tools_config: &ToolsConfig, findings: Arc<FindingStore>) -> Result<Self> {
        let denylist = tools_config
            .data_sandbox
            .denylist
            .iter()
            .map(|p| Regex::new(p).map_err(|e| Error::Config(format!("invalid denylist pattern {p}: {e}"))))
            .collect::<Result<Vec<_>>>()?;

        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(ListResourcesTool),
            Arc::new(GetResourceInfoTool),
            Arc::new(ReadResourceTool),
            Arc::new(SearchDocumentsTool { retriever: None }),
            Arc::new(SearchWebTool { client: None }),
            Arc::new(AnalyzeDataTool {
                runner: None,
                denylist,
                row_cap: tools_config.data_sandbox.row_cap,
            }),
            Arc::new(ViewImageTool { client: None }),
            Arc::new(SaveFindingTool { findings }),
        ];

        Ok(Self { tools })
    }

    pub fn available_tools<'a>(&'a self, ctx: &ToolContext) -> Vec<&'a Arc<dyn Tool>> {
        self.tools.iter().filter(|t| t.is_available(ctx)).collect()
    }

    pub fn tool_definitions(&self, ctx: &ToolContext) -> Vec<sa_domain::message::ToolDefinition> {
        self.available_tools(ctx)
            .into_iter()
            .map(|t| sa_domain::message::ToolDefinition {
                name: t.name().to_owned(),
                description: t.description().to_owned(),
                parameters: t.input_schema(),
            })
            .collect()
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of one dispatch, ready for the Agent Loop to mirror to the bus
/// and fold back into the model's conversation.
pub struct DispatchOutcome {
    pub tool_call_event: JobEvent,
    pub tool_result_event: JobEvent,
    pub content: String,
    pub sources: Option<Vec<Value>>,
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Unknown tool names and unavailable capabilities both resolve to a
    /// clean failed `tool_result` rather than raising.
    pub async fn dispatch(&self, call: &ToolCall, ctx: &ToolContext) -> DispatchOutcome {
        let query = derive_query(&call.arguments, &call.tool_name);
        let tool_call_event = JobEvent::ToolCall {
            tool: call.tool_name.clone(),
            query: query.clone(),
            id: Some(call.call_id.clone()),
        };

        let result = match self.registry.find(&call.tool_name) {
            None => ToolResult::failed(format!("unknown tool: {}", call.tool_name))
                .with_metadata(json!({ "reason": "unknown_tool" })),
            Some(tool) if !tool.is_available(ctx) => ToolResult::capability_unavailable(tool.name()),
            Some(tool) => tool
                .execute(call.arguments.clone(), ctx)
                .await
                .unwrap_or_else(|e| ToolResult::failed(e.to_string())),
        };

        let sources = result
            .metadata
            .get("sources")
            .and_then(|v| v.as_array())
            .cloned();
        let saved = result.metadata.get("saved").and_then(|v| v.as_bool());
        let finding_id = result.metadata.get("finding_id").and_then(|v| v.as_str()).map(String::from);
        let finding_content = result
            .metadata
            .get("finding_content")
            .and_then(|v| v.as_str())
            .map(String::from);

        let tool_result_event = JobEvent::ToolResult {
            tool: call.tool_name.clone(),
            found: result.success,
            query,
            saved,
            finding_id,
            finding_content,
        };

        DispatchOutcome {
            tool_call_event,
            tool_result_event,
            content: result.content,
            sources,
        }
    }
}

fn derive_query(params: &Value, tool_name: &str) -> String {
    for key in ["query", "resource_name", "resource_id"] {
        if let Some(s) = params.get(key).and_then(|v| v.as_str()) {
            return s.to_owned();
        }
    }
    if let Some(content) = params.get("content").and_then(|v| v.as_str()) {
        return content.chars().take(60).collect();
    }
    tool_name.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::Resource;
    use std::collections::HashSet;

    fn ctx(resources: Vec<Resource>, available: HashSet<ToolCapability>) -> ToolContext {
        ToolContext {
            project_id: "p1".into(),
            thread_id: "t1".into(),
            job_id: "j1".into(),
            available,
            resources,
        }
    }

    fn registry() -> (tempfile::TempDir, ToolRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let findings = Arc::new(FindingStore::new(dir.path()).unwrap());
        let registry = ToolRegistry::new(&ToolsConfig::default(), findings).unwrap();
        (dir, registry)
    }

    #[test]
    fn unavailable_tools_are_excluded_from_definitions() {
        let (_dir, registry) = registry();
        let c = ctx(vec![], HashSet::new());
        let names: Vec<_> = registry.tool_definitions(&c).into_iter().map(|d| d.name).collect();
        assert!(names.contains(&"list_resources".to_string()));
        assert!(!names.contains(&"search_documents".to_string()));
    }

    #[test]
    fn retriever_capability_exposes_search_documents() {
        let (_dir, registry) = registry();
        let mut available = HashSet::new();
        available.insert(ToolCapability::Retriever);
        let c = ctx(vec![], available);
        let names: Vec<_> = registry.tool_definitions(&c).into_iter().map(|d| d.name).collect();
        assert!(names.contains(&"search_documents".to_string()));
    }

    #[tokio::test]
    async fn dispatch_unknown_tool_is_a_clean_failure() {
        let (_dir, registry) = registry();
        let executor = ToolExecutor::new(Arc::new(registry));
        let c = ctx(vec![], HashSet::new());
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "nonexistent".into(),
            arguments: json!({}),
        };
        let outcome = executor.dispatch(&call, &c).await;
        match outcome.tool_result_event {
            JobEvent::ToolResult { found, .. } => assert!(!found),
            _ => panic!("expected tool_result"),
        }
    }

    #[tokio::test]
    async fn dispatch_unwired_search_documents_reports_capability_unavailable() {
        let (_dir, registry) = registry();
        let executor = ToolExecutor::new(Arc::new(registry));
        let mut available = HashSet::new();
        available.insert(ToolCapability::Retriever);
        let c = ctx(vec![], available);
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "search_documents".into(),
            arguments: json!({ "query": "revenue" }),
        };
        let outcome = executor.dispatch(&call, &c).await;
        assert_eq!(outcome.content, "search_documents is currently unavailable");
    }

    #[tokio::test]
    async fn analyze_data_denylist_blocks_before_dispatching_to_runner() {
        let (_dir, registry) = registry();
        let executor = ToolExecutor::new(Arc::new(registry));
        let mut available = HashSet::new();
        available.insert(ToolCapability::DataSandbox);
        let c = ctx(vec![], available);
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "analyze_data".into(),
            arguments: json!({ "resource_id": "r1", "code": "import os" }),
        };
        let outcome = executor.dispatch(&call, &c).await;
        assert_eq!(outcome.content, "unsafe_operation");
    }

    #[tokio::test]
    async fn save_finding_persists_and_reports_finding_id() {
        let (_dir, registry) = registry();
        let executor = ToolExecutor::new(Arc::new(registry));
        let c = ctx(vec![], HashSet::new());
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "save_finding".into(),
            arguments: json!({ "content": "Q3 revenue grew 12%" }),
        };
        let outcome = executor.dispatch(&call, &c).await;
        match outcome.tool_result_event {
            JobEvent::ToolResult { found, finding_id, .. } => {
                assert!(found);
                assert!(finding_id.is_some());
            }
            _ => panic!("expected tool_result"),
        }
    }
}
