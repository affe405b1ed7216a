//! `git_status`, `git_diff`, `git_log_short` — thin wrappers over a fixed git argv, run
//! through `ProcessRunner` so they inherit its timeout and output-capture behavior.

use serde_json::{json, Value};
use spectrail_sandbox::{bound_text, PathGuard, ProcessRunner};
use tokio_util::sync::CancellationToken;

use crate::registry::Tool;

const DIFF_CAP_BYTES: usize = 100 * 1024;

pub struct GitStatusTool;

impl GitStatusTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GitStatusTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for GitStatusTool {
    fn name(&self) -> &str {
        "git_status"
    }

    fn description(&self) -> &str {
        "Show `git status --porcelain=v1 -b` for the repository."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"project_id": {"type": "string", "description": "Project identifier"}},
            "required": ["project_id"]
        })
    }

    async fn execute(&self, guard: &PathGuard, _args: &Value, cancel: CancellationToken) -> Value {
        let runner = ProcessRunner::new(guard.root());
        let argv = ["git", "status", "--porcelain=v1", "-b"].map(String::from);
        let out = runner.run_with_timeout(&argv, std::time::Duration::from_secs(30), cancel).await;
        if !out.success {
            return json!({"error": format!("git status failed: {}", out.stderr)});
        }
        json!({"status": out.stdout})
    }
}

pub struct GitDiffTool;

impl GitDiffTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GitDiffTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for GitDiffTool {
    fn name(&self) -> &str {
        "git_diff"
    }

    fn description(&self) -> &str {
        "Show `git diff` (or `git diff --cached` when staged=true), clipped to 100KiB."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_id": {"type": "string", "description": "Project identifier"},
                "staged": {"type": "boolean", "description": "Diff the index instead of the working tree (default false)"}
            },
            "required": ["project_id"]
        })
    }

    async fn execute(&self, guard: &PathGuard, args: &Value, cancel: CancellationToken) -> Value {
        let staged = args.get("staged").and_then(|v| v.as_bool()).unwrap_or(false);
        let runner = ProcessRunner::new(guard.root());
        let mut argv = vec!["git".to_string(), "diff".to_string()];
        if staged {
            argv.push("--cached".to_string());
        }
        let out = runner.run_with_timeout(&argv, std::time::Duration::from_secs(30), cancel).await;
        if !out.success {
            return json!({"error": format!("git diff failed: {}", out.stderr)});
        }
        let bounded = bound_text(&out.stdout, DIFF_CAP_BYTES);
        json!({"diff": bounded.clipped, "truncated": bounded.truncated, "total_bytes": bounded.total_size})
    }
}

pub struct GitLogShortTool;

impl GitLogShortTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GitLogShortTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for GitLogShortTool {
    fn name(&self) -> &str {
        "git_log_short"
    }

    fn description(&self) -> &str {
        "Show `git log --oneline -n <max_commits>` for the repository."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_id": {"type": "string", "description": "Project identifier"},
                "max_commits": {"type": "integer", "description": "Number of commits to show (default 10)"}
            },
            "required": ["project_id"]
        })
    }

    async fn execute(&self, guard: &PathGuard, args: &Value, cancel: CancellationToken) -> Value {
        let max_commits = args.get("max_commits").and_then(|v| v.as_u64()).unwrap_or(10);
        let runner = ProcessRunner::new(guard.root());
        let argv = ["git".to_string(), "log".to_string(), "--oneline".to_string(), "-n".to_string(), max_commits.to_string()];
        let out = runner.run_with_timeout(&argv, std::time::Duration::from_secs(30), cancel).await;
        if !out.success {
            return json!({"error": format!("git log failed: {}", out.stderr)});
        }
        let log: Vec<String> = out.stdout.lines().map(|l| l.to_string()).collect();
        json!({"log": log})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn init_repo(root: &std::path::Path) {
        std::process::Command::new("git").arg("init").arg("-q").current_dir(root).status().unwrap();
        std::process::Command::new("git")
            .args(["config", "user.email", "a@b.c"])
            .current_dir(root)
            .status()
            .unwrap();
        std::process::Command::new("git")
            .args(["config", "user.name", "tester"])
            .current_dir(root)
            .status()
            .unwrap();
    }

    #[tokio::test]
    async fn git_status_reports_branch_header() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());
        let guard = PathGuard::new(tmp.path()).unwrap();
        let tool = GitStatusTool::new();
        let result = tool.execute(&guard, &json!({"project_id": "p1"}), CancellationToken::new()).await;
        assert!(result["status"].as_str().unwrap().contains("##"));
    }

    #[tokio::test]
    async fn git_log_short_reports_commits() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());
        std::fs::write(tmp.path().join("a.txt"), "x").unwrap();
        std::process::Command::new("git").args(["add", "."]).current_dir(tmp.path()).status().unwrap();
        std::process::Command::new("git")
            .args(["commit", "-q", "-m", "initial"])
            .current_dir(tmp.path())
            .status()
            .unwrap();

        let guard = PathGuard::new(tmp.path()).unwrap();
        let tool = GitLogShortTool::new();
        let result = tool.execute(&guard, &json!({"project_id": "p1"}), CancellationToken::new()).await;
        let log = result["log"].as_array().unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].as_str().unwrap().contains("initial"));
    }

    #[tokio::test]
    async fn git_diff_shows_unstaged_changes() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());
        std::fs::write(tmp.path().join("a.txt"), "x").unwrap();
        std::process::Command::new("git").args(["add", "."]).current_dir(tmp.path()).status().unwrap();
        std::process::Command::new("git")
            .args(["commit", "-q", "-m", "initial"])
            .current_dir(tmp.path())
            .status()
            .unwrap();
        std::fs::write(tmp.path().join("a.txt"), "y").unwrap();

        let guard = PathGuard::new(tmp.path()).unwrap();
        let tool = GitDiffTool::new();
        let result = tool.execute(&guard, &json!({"project_id": "p1"}), CancellationToken::new()).await;
        assert!(result["diff"].as_str().unwrap().contains("a.txt"));
        assert_eq!(result["truncated"], false);
    }
}
