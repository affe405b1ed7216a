//! A `ProjectResolver` scoped to a single facade call.
//!
//! `ToolRegistry::execute` needs a synchronous `project_id -> repo root` lookup, but RunLog's
//! project table is behind an async SQLite bridge. Rather than block the async runtime inside
//! the trait method, the facade resolves the project once (async) at the top of
//! `generate_plan`/`verify_task` and hands the tool registry a resolver that already knows the
//! answer — "a snapshot captured at run start", the same treatment §9 prescribes for settings.

use std::path::PathBuf;

use spectrail_core::{Error, ProjectResolver, Result};

pub struct StaticResolver {
    project_id: String,
    repo_path: PathBuf,
}

impl StaticResolver {
    pub fn new(project_id: impl Into<String>, repo_path: impl Into<PathBuf>) -> Self {
        Self { project_id: project_id.into(), repo_path: repo_path.into() }
    }
}

impl ProjectResolver for StaticResolver {
    fn repo_path(&self, project_id: &str) -> Result<PathBuf> {
        if project_id == self.project_id {
            Ok(self.repo_path.clone())
        } else {
            Err(Error::RepoUnavailable(format!("unknown project for this run: {project_id}")))
        }
    }
}
