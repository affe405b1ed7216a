//! `run_command` — runs one of a fixed `(kind, runner)` argv from an allow-list, with the
//! runner auto-detected from lockfiles when not given explicitly. Anything outside the
//! allow-list is rejected before a process is ever spawned.

use serde_json::{json, Value};
use spectrail_sandbox::{PathGuard, ProcessRunner};
use tokio_util::sync::CancellationToken;

use crate::registry::Tool;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// `(kind, runner) -> argv`. Authoritative: a request that doesn't match a row here is
/// `DisallowedCommand`, full stop — no shell interpretation, no user-supplied argv.
fn allow_list(kind: &str, runner: &str) -> Option<&'static [&'static str]> {
    match (kind, runner) {
        ("tests", "cargo") => Some(&["cargo", "test"]),
        ("tests", "pnpm") => Some(&["pnpm", "test"]),
        ("tests", "yarn") => Some(&["yarn", "test"]),
        ("tests", "npm") => Some(&["npm", "test"]),
        ("tests", "pytest") => Some(&["pytest"]),
        ("lint", "cargo") => Some(&["cargo", "clippy", "--all-targets", "--", "-D", "warnings"]),
        ("lint", "pnpm") => Some(&["pnpm", "run", "lint"]),
        ("lint", "yarn") => Some(&["yarn", "lint"]),
        ("lint", "npm") => Some(&["npm", "run", "lint"]),
        ("lint", "pytest") => Some(&["ruff", "check", "."]),
        ("build", "cargo") => Some(&["cargo", "build"]),
        ("build", "pnpm") => Some(&["pnpm", "run", "build"]),
        ("build", "yarn") => Some(&["yarn", "build"]),
        ("build", "npm") => Some(&["npm", "run", "build"]),
        ("build", "pytest") => Some(&["python", "-m", "build"]),
        _ => None,
    }
}

/// Detection order: `Cargo.toml` -> cargo, `pnpm-lock.yaml` -> pnpm, `yarn.lock` -> yarn,
/// `package-lock.json`/`package.json` -> npm, `pyproject.toml` -> pytest.
fn detect_runner(root: &std::path::Path) -> Option<&'static str> {
    if root.join("Cargo.toml").is_file() {
        Some("cargo")
    } else if root.join("pnpm-lock.yaml").is_file() {
        Some("pnpm")
    } else if root.join("yarn.lock").is_file() {
        Some("yarn")
    } else if root.join("package-lock.json").is_file() || root.join("package.json").is_file() {
        Some("npm")
    } else if root.join("pyproject.toml").is_file() {
        Some("pytest")
    } else {
        None
    }
}

pub struct RunCommandTool;

impl RunCommandTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RunCommandTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a test/lint/build command chosen from a fixed allow-list for the detected \
         project runner. Commands outside the allow-list are rejected."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_id": {"type": "string", "description": "Project identifier"},
                "kind": {"type": "string", "enum": ["tests", "lint", "build"]},
                "runner": {
                    "type": "string",
                    "description": "Explicit runner; auto-detected from lockfiles if omitted"
                }
            },
            "required": ["project_id", "kind"]
        })
    }

    async fn execute(&self, guard: &PathGuard, args: &Value, cancel: CancellationToken) -> Value {
        let Some(kind) = args.get("kind").and_then(|v| v.as_str()) else {
            return json!({"error": "missing required field: kind"});
        };

        let runner = match args.get("runner").and_then(|v| v.as_str()) {
            Some(r) => r.to_string(),
            None => match detect_runner(guard.root()) {
                Some(r) => r.to_string(),
                None => return json!({"error": "disallowed command: no runner detected and none specified"}),
            },
        };

        let Some(argv) = allow_list(kind, &runner) else {
            return json!({"error": format!("disallowed command: no allow-listed argv for kind={kind} runner={runner}")});
        };

        let argv: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        let runner_proc = ProcessRunner::new(guard.root());
        let out = runner_proc
            .run_with_timeout(&argv, std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS), cancel)
            .await;

        json!({
            "success": out.success,
            "exit_code": out.exit_code,
            "stdout": out.stdout,
            "stderr": out.stderr,
            "timed_out": out.timed_out
        })
    }
}
