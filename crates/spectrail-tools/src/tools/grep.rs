//! `grep` — prefers an external `rg` binary, falls back to an in-tree regex walker.

use regex::Regex;
use serde_json::{json, Value};
use spectrail_core::Error;
use spectrail_sandbox::{PathGuard, ProcessRunner};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::registry::Tool;

const DEFAULT_MAX_RESULTS: usize = 200;
const PRUNED_DIRS: &[&str] = &["node_modules", "target", "dist", "build", ".git"];

pub struct GrepTool;

impl GrepTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GrepTool {
    fn default() -> Self {
        Self::new()
    }
}

fn rg_available() -> bool {
    which("rg")
}

#[cfg(unix)]
fn which(program: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn which(_program: &str) -> bool {
    false
}

async fn run_ripgrep(
    root: &std::path::Path,
    query: &str,
    search_root: Option<&std::path::Path>,
    max_results: usize,
) -> Option<Vec<String>> {
    let runner = ProcessRunner::new(root);
    let mut argv =
        vec!["rg".to_string(), "--line-number".to_string(), "--no-heading".to_string(), query.to_string()];
    if let Some(p) = search_root {
        argv.push(p.to_string_lossy().into_owned());
    }
    let output = runner.run(&argv).await;
    if output.timed_out {
        return None;
    }
    // rg exits 1 when there are no matches; treat that as a valid empty result, not a failure.
    if !output.success && output.exit_code != Some(1) {
        return None;
    }
    let lines: Vec<String> = output.stdout.lines().take(max_results).map(|l| l.to_string()).collect();
    Some(lines)
}

fn run_fallback(
    root: &std::path::Path,
    regex: &Regex,
    search_root: Option<&std::path::Path>,
    max_results: usize,
) -> Vec<String> {
    let search_root = search_root.map(|p| p.to_path_buf()).unwrap_or_else(|| root.to_path_buf());

    let mut results = Vec::new();
    for entry in WalkDir::new(&search_root)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !PRUNED_DIRS.contains(&name.as_ref())
        })
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(bytes) = std::fs::read(entry.path()) else { continue };
        if bytes.len() > 512 && bytes[..512].contains(&0) {
            continue;
        }
        let Ok(content) = String::from_utf8(bytes) else { continue };
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        for (i, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                results.push(format!("{}:{}:{}", rel.display(), i + 1, line));
                if results.len() >= max_results {
                    return results;
                }
            }
        }
    }
    results
}

#[async_trait::async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents for a pattern, preferring ripgrep when available. Results are \
         formatted path:line:text."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_id": {"type": "string", "description": "Project identifier"},
                "query": {"type": "string", "description": "Substring or regex to search for"},
                "path": {"type": "string", "description": "Restrict the search to this path"},
                "max_results": {"type": "integer", "description": "Maximum result lines (default 200)"}
            },
            "required": ["project_id", "query"]
        })
    }

    async fn execute(&self, guard: &PathGuard, args: &Value, _cancel: CancellationToken) -> Value {
        let Some(query) = args.get("query").and_then(|v| v.as_str()) else {
            return json!({"error": Error::InvalidArgs("missing required field: query".to_string()).to_string()});
        };
        let max_results =
            args.get("max_results").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_MAX_RESULTS as u64) as usize;

        // `path`, when given, restricts the search to a subtree — it must be routed through
        // the guard like every other tool's path argument (§4.4), or a model-supplied `../`
        // walks the search outside the repo root.
        let search_root = match args.get("path").and_then(|v| v.as_str()) {
            Some(p) => match guard.resolve_existing(p) {
                Ok(resolved) => Some(resolved),
                Err(e) => return json!({"error": e.to_string()}),
            },
            None => None,
        };

        if rg_available() {
            if let Some(results) = run_ripgrep(guard.root(), query, search_root.as_deref(), max_results).await {
                return json!({"results": results, "tool": "ripgrep"});
            }
        }

        let regex = match Regex::new(query) {
            Ok(r) => r,
            Err(_) => match Regex::new(&regex::escape(query)) {
                Ok(r) => r,
                Err(e) => return json!({"error": format!("invalid pattern: {e}")}),
            },
        };
        let results = run_fallback(guard.root(), &regex, search_root.as_deref(), max_results);
        json!({"results": results, "tool": "fallback"})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fallback_finds_matches_formatted_path_line_text() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "hello\nworld\nhello again").unwrap();
        let guard = PathGuard::new(tmp.path()).unwrap();
        let tool = GrepTool::new();
        let result =
            tool.execute(&guard, &json!({"project_id": "p1", "query": "hello"}), CancellationToken::new()).await;
        let results: Vec<String> =
            result["results"].as_array().unwrap().iter().map(|v| v.as_str().unwrap().to_string()).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].starts_with("a.txt:1:"));
        assert!(results[1].starts_with("a.txt:3:"));
    }

    #[tokio::test]
    async fn fallback_skips_binary_files() {
        let tmp = tempfile::tempdir().unwrap();
        let mut bytes = vec![0u8; 600];
        bytes[0] = b'h';
        std::fs::write(tmp.path().join("bin.dat"), &bytes).unwrap();
        let guard = PathGuard::new(tmp.path()).unwrap();
        let tool = GrepTool::new();
        let result = tool.execute(&guard, &json!({"project_id": "p1", "query": "h"}), CancellationToken::new()).await;
        assert!(result["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn path_traversal_outside_root_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "hello").unwrap();
        let guard = PathGuard::new(tmp.path()).unwrap();
        let tool = GrepTool::new();
        let result = tool
            .execute(
                &guard,
                &json!({"project_id": "p1", "query": "hello", "path": "../../etc"}),
                CancellationToken::new(),
            )
            .await;
        let err = result["error"].as_str().unwrap();
        assert!(err.contains("path escape"));
    }

    #[tokio::test]
    async fn respects_max_results() {
        let tmp = tempfile::tempdir().unwrap();
        let content = (0..10).map(|i| format!("match{i}")).collect::<Vec<_>>().join("\n");
        std::fs::write(tmp.path().join("a.txt"), content).unwrap();
        let guard = PathGuard::new(tmp.path()).unwrap();
        let tool = GrepTool::new();
        let result = tool
            .execute(
                &guard,
                &json!({"project_id": "p1", "query": "match", "max_results": 3}),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(result["results"].as_array().unwrap().len(), 3);
    }
}
