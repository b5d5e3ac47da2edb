//! F. Tool Adapter (spec.md §4.F): a small `Tool` trait plus an explicit,
//! non-reflective registry. Ships three intentionally thin stand-ins
//! (`web_search`, `code_exec`, `file_ops_safe`) sufficient to exercise
//! routing; concrete provider-grade tools are out of scope (spec.md §1).

use std::collections::HashMap;
use std::sync::Arc;

use amd_core::{EngineError, Result, ToolResult};
use async_trait::async_trait;

/// Arguments passed to a tool invocation, one entry per named parameter on
/// the `@tools` token (e.g. `web_search(query="rust async")`).
pub type ToolArgs = HashMap<String, String>;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Short natural-language description surfaced to the LLM alongside the
    /// manifest of available tools for the step.
    fn instructions(&self) -> &str;

    async fn invoke(&self, args: &ToolArgs) -> Result<ToolResult>;
}

/// Explicit registration, no reflection (Design Notes §9): every available
/// tool must be registered by name at bootstrap.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Names in registration order, used to build the manifest shown to the
    /// LLM for a step's `@tools` list.
    pub fn manifest(&self, requested: &[String]) -> Vec<(String, String)> {
        requested
            .iter()
            .filter_map(|name| {
                self.tools
                    .get(name)
                    .map(|t| (t.name().to_string(), t.instructions().to_string()))
            })
            .collect()
    }

    pub async fn invoke(&self, name: &str, args: &ToolArgs) -> Result<ToolResult> {
        let tool = self.get(name).ok_or_else(|| EngineError::ToolError {
            tool: name.to_string(),
            message: "not registered".to_string(),
        })?;
        tracing::debug!(tool = name, "invoking tool");
        tool.invoke(args).await
    }
}

/// Builds the default registry (`web_search`, `code_exec`, `file_ops_safe`)
/// seeded at runtime bootstrap.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(WebSearchTool));
    registry.register(Arc::new(CodeExecTool));
    registry.register(Arc::new(FileOpsSafeTool));
    registry
}

/// Thin stand-in: echoes the query back wrapped in a note. A real provider
/// integration is out of scope (spec.md §1).
pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn instructions(&self) -> &str {
        "Search the web for `query` and return a short summary of results."
    }

    async fn invoke(&self, args: &ToolArgs) -> Result<ToolResult> {
        let query = args.get("query").cloned().unwrap_or_default();
        Ok(ToolResult::Text(format!(
            "[web_search stand-in] no live results for '{query}'"
        )))
    }
}

/// Thin stand-in: refuses execution and reports why, rather than actually
/// shelling out (spec.md §1 excludes concrete tool implementations).
pub struct CodeExecTool;

#[async_trait]
impl Tool for CodeExecTool {
    fn name(&self) -> &str {
        "code_exec"
    }

    fn instructions(&self) -> &str {
        "Execute a short code snippet in `code` and return its output."
    }

    async fn invoke(&self, _args: &ToolArgs) -> Result<ToolResult> {
        Err(EngineError::ToolError {
            tool: "code_exec".to_string(),
            message: "no sandboxed executor configured in this build".to_string(),
        })
    }
}

/// Thin stand-in for a sandboxed read-only vault file operation; returns a
/// structured description rather than reading real files, since the Tool
/// Adapter itself doesn't own a `Vault` handle — the Step Engine injects a
/// vault-bound implementation at bootstrap when one is needed.
pub struct FileOpsSafeTool;

#[async_trait]
impl Tool for FileOpsSafeTool {
    fn name(&self) -> &str {
        "file_ops_safe"
    }

    fn instructions(&self) -> &str {
        "Read a vault file by relative `path` (sandboxed, read-only)."
    }

    async fn invoke(&self, args: &ToolArgs) -> Result<ToolResult> {
        let path = args.get("path").cloned().unwrap_or_default();
        Ok(ToolResult::Structured(serde_json::json!({
            "path": path,
            "note": "file_ops_safe stand-in: no vault bound",
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_invokes_registered_tool() {
        let registry = default_registry();
        let mut args = ToolArgs::new();
        args.insert("query".into(), "rust".into());
        let result = registry.invoke("web_search", &args).await.unwrap();
        assert!(result.as_text().contains("rust"));
    }

    #[tokio::test]
    async fn invoking_unregistered_tool_errors() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("bogus", &ToolArgs::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::ToolError { .. }));
    }

    #[test]
    fn manifest_only_includes_requested_and_registered_tools() {
        let registry = default_registry();
        let manifest = registry.manifest(&["web_search".to_string(), "bogus".to_string()]);
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].0, "web_search");
    }

    #[tokio::test]
    async fn code_exec_stand_in_reports_unconfigured() {
        let registry = default_registry();
        let err = registry
            .invoke("code_exec", &ToolArgs::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ToolError { .. }));
    }
}
