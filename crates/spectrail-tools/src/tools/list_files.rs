//! `list_files` — gitignore-aware traversal from the repo root.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::{json, Value};
use spectrail_sandbox::PathGuard;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::registry::Tool;

const DEFAULT_MAX_FILES: usize = 2000;
const PRUNED_DIRS: &[&str] = &["node_modules", "target", "dist", "build", ".git"];

pub struct ListFilesTool;

impl ListFilesTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ListFilesTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiles every `.gitignore` found under `root` into a single matcher. Not a full
/// gitignore implementation (no negation, no precedence between nested files) — a
/// pragmatic approximation built from the corpus's `globset`/`walkdir` idiom rather than
/// pulling in a dedicated gitignore crate the teacher stack doesn't carry.
fn load_gitignore_globs(root: &std::path::Path) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !PRUNED_DIRS.contains(&name.as_ref())
        })
        .filter_map(|e| e.ok())
    {
        if entry.file_name() != ".gitignore" {
            continue;
        }
        let Ok(contents) = std::fs::read_to_string(entry.path()) else { continue };
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let pattern = line.trim_start_matches('/').trim_end_matches('/');
            if let Ok(glob) = Glob::new(&format!("**/{pattern}")) {
                builder.add(glob);
            }
            if let Ok(glob) = Glob::new(&format!("**/{pattern}/**")) {
                builder.add(glob);
            }
        }
    }
    builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap())
}

#[async_trait::async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files in the repository, honoring .gitignore and pruning common build/dependency \
         directories. Optionally filter by glob patterns."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_id": {"type": "string", "description": "Project identifier"},
                "globs": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional glob patterns to filter returned paths"
                },
                "max_files": {"type": "integer", "description": "Maximum files to return (default 2000)"}
            },
            "required": ["project_id"]
        })
    }

    async fn execute(&self, guard: &PathGuard, args: &Value, _cancel: CancellationToken) -> Value {
        let max_files = args.get("max_files").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_MAX_FILES as u64) as usize;

        let globs: Vec<globset::GlobMatcher> = match args.get("globs").and_then(|v| v.as_array()) {
            Some(arr) => {
                let mut compiled = Vec::new();
                for g in arr {
                    let Some(pattern) = g.as_str() else {
                        return json!({"error": "globs entries must be strings"});
                    };
                    match Glob::new(pattern) {
                        Ok(glob) => compiled.push(glob.compile_matcher()),
                        Err(e) => return json!({"error": format!("invalid glob '{pattern}': {e}")}),
                    }
                }
                compiled
            }
            None => Vec::new(),
        };

        let root = guard.root();
        let ignore_globs = load_gitignore_globs(root);

        let mut files = Vec::new();
        let mut truncated = false;

        for entry in WalkDir::new(root)
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
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if ignore_globs.is_match(rel) {
                continue;
            }
            if !globs.is_empty() && !globs.iter().any(|g| g.is_match(rel)) {
                continue;
            }

            if files.len() >= max_files {
                truncated = true;
                break;
            }
            files.push(rel.to_string_lossy().to_string());
        }

        json!({"files": files, "truncated": truncated})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_files_relative_to_root() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "x").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/b.txt"), "y").unwrap();

        let guard = PathGuard::new(tmp.path()).unwrap();
        let tool = ListFilesTool::new();
        let result = tool.execute(&guard, &json!({"project_id": "p1"}), CancellationToken::new()).await;
        let files: Vec<String> =
            result["files"].as_array().unwrap().iter().map(|v| v.as_str().unwrap().to_string()).collect();
        assert!(files.contains(&"a.txt".to_string()));
        assert!(files.iter().any(|f| f.contains("b.txt")));
        assert_eq!(result["truncated"], false);
    }

    #[tokio::test]
    async fn prunes_junk_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("node_modules")).unwrap();
        std::fs::write(tmp.path().join("node_modules/pkg.js"), "x").unwrap();
        std::fs::write(tmp.path().join("keep.txt"), "x").unwrap();

        let guard = PathGuard::new(tmp.path()).unwrap();
        let tool = ListFilesTool::new();
        let result = tool.execute(&guard, &json!({"project_id": "p1"}), CancellationToken::new()).await;
        let files: Vec<String> =
            result["files"].as_array().unwrap().iter().map(|v| v.as_str().unwrap().to_string()).collect();
        assert!(!files.iter().any(|f| f.contains("node_modules")));
        assert!(files.contains(&"keep.txt".to_string()));
    }

    #[tokio::test]
    async fn honors_gitignore() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".gitignore"), "*.log\n").unwrap();
        std::fs::write(tmp.path().join("debug.log"), "x").unwrap();
        std::fs::write(tmp.path().join("keep.txt"), "x").unwrap();

        let guard = PathGuard::new(tmp.path()).unwrap();
        let tool = ListFilesTool::new();
        let result = tool.execute(&guard, &json!({"project_id": "p1"}), CancellationToken::new()).await;
        let files: Vec<String> =
            result["files"].as_array().unwrap().iter().map(|v| v.as_str().unwrap().to_string()).collect();
        assert!(!files.iter().any(|f| f.ends_with(".log")));
        assert!(files.contains(&"keep.txt".to_string()));
    }

    #[tokio::test]
    async fn max_files_truncates() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(tmp.path().join(format!("f{i}.txt")), "x").unwrap();
        }
        let guard = PathGuard::new(tmp.path()).unwrap();
        let tool = ListFilesTool::new();
        let result =
            tool.execute(&guard, &json!({"project_id": "p1", "max_files": 3}), CancellationToken::new()).await;
        assert_eq!(result["files"].as_array().unwrap().len(), 3);
        assert_eq!(result["truncated"], true);
    }

    #[tokio::test]
    async fn fewer_than_max_is_not_truncated() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("f.txt"), "x").unwrap();
        let guard = PathGuard::new(tmp.path()).unwrap();
        let tool = ListFilesTool::new();
        let result =
            tool.execute(&guard, &json!({"project_id": "p1", "max_files": 3}), CancellationToken::new()).await;
        assert_eq!(result["truncated"], false);
    }

    #[tokio::test]
    async fn filters_by_globs() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.rs"), "x").unwrap();
        std::fs::write(tmp.path().join("b.md"), "x").unwrap();
        let guard = PathGuard::new(tmp.path()).unwrap();
        let tool = ListFilesTool::new();
        let result = tool
            .execute(&guard, &json!({"project_id": "p1", "globs": ["*.rs"]}), CancellationToken::new())
            .await;
        let files: Vec<String> =
            result["files"].as_array().unwrap().iter().map(|v| v.as_str().unwrap().to_string()).collect();
        assert_eq!(files, vec!["a.rs".to_string()]);
    }
}
