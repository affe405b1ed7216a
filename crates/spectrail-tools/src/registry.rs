//! Tool registry and trait definitions.
//!
//! Each tool is a self-contained module implementing the `Tool` trait. The schema list
//! (`get_definitions`) and the dispatch table (`HashMap`-backed `execute`) are derived from
//! the same registrations, so they cannot drift out of sync — the §4.5 invariant the registry
//! exists to uphold.

use serde_json::{json, Value};
use spectrail_core::{Error, ProjectResolver, Result, ToolDefinition};
use spectrail_sandbox::PathGuard;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A single tool implementation. Every tool's input schema must require `project_id`
/// (§4.4: "every schema names `project_id` required").
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn input_schema(&self) -> Value;

    /// Execute against an already-resolved, already-rooted `PathGuard`. Tool-local failures
    /// (bad args, path escape, disallowed command, timeout) are returned as a JSON value
    /// shaped `{"error": "..."}` rather than propagated — a tool failure must not crash
    /// the loop (§4.4).
    async fn execute(&self, guard: &PathGuard, args: &Value, cancel: CancellationToken) -> Value;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    resolver: Arc<dyn ProjectResolver>,
}

impl ToolRegistry {
    pub fn new(resolver: Arc<dyn ProjectResolver>) -> Self {
        Self { tools: HashMap::new(), resolver }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool-schema declarations for the provider's `tools` parameter.
    pub fn get_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Dispatch `name(args)`. Resolution of `project_id` → repo root happens here, once,
    /// before the tool runs. `RepoUnavailable` is the only case that bubbles as `Err`; every
    /// other failure is folded into the returned JSON value as an `{"error": ...}` envelope
    /// so `AgentLoop` can persist it and keep going.
    ///
    /// `default_project_id`, when given, is injected into `args` before the presence check
    /// (§4.9 EXECUTE_TOOLS: "the `project_id` is injected if the model omitted it") — the
    /// caller's own run/task already pins a single project, so a model that forgets to name
    /// it in a tool call shouldn't be punished with `InvalidArgs`.
    pub async fn execute(
        &self,
        name: &str,
        mut args: Value,
        default_project_id: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<Value> {
        let Some(tool) = self.tools.get(name) else {
            return Ok(json!({ "error": Error::UnknownTool(name.to_string()).to_string() }));
        };

        if let Value::Object(ref mut map) = args {
            if !map.contains_key("project_id") {
                if let Some(pid) = default_project_id {
                    map.insert("project_id".to_string(), Value::String(pid.to_string()));
                }
            }
        }

        let project_id = match args.get("project_id").and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => {
                return Ok(json!({
                    "error": Error::InvalidArgs("missing required field: project_id".to_string()).to_string()
                }))
            }
        };

        let repo_root = self.resolver.repo_path(&project_id)?;
        let guard = PathGuard::new(&repo_root)?;

        Ok(tool.execute(&guard, &args, cancel).await)
    }
}
