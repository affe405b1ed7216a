//! `read_file` — bounded file read with NUL-byte binary detection.

use serde_json::{json, Value};
use spectrail_core::Error;
use spectrail_sandbox::{bound_text, PathGuard};
use tokio_util::sync::CancellationToken;

use crate::registry::Tool;

const DEFAULT_MAX_BYTES: usize = 200_000;
const BINARY_SNIFF_WINDOW: usize = 8192;

pub struct ReadFileTool;

impl ReadFileTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(BINARY_SNIFF_WINDOW)].contains(&0)
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file's contents from the repository, bounded to max_bytes. Binary files are \
         reported without content."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_id": {"type": "string", "description": "Project identifier"},
                "path": {"type": "string", "description": "Path relative to the repo root"},
                "max_bytes": {"type": "integer", "description": "Maximum bytes to return (default 200000)"}
            },
            "required": ["project_id", "path"]
        })
    }

    async fn execute(&self, guard: &PathGuard, args: &Value, _cancel: CancellationToken) -> Value {
        let Some(path) = args.get("path").and_then(|v| v.as_str()) else {
            return json!({"error": Error::InvalidArgs("missing required field: path".to_string()).to_string()});
        };
        let max_bytes = args.get("max_bytes").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_MAX_BYTES as u64) as usize;

        let resolved = match guard.resolve_existing(path) {
            Ok(p) => p,
            Err(e) => return json!({"error": e.to_string()}),
        };

        let bytes = match tokio::fs::read(&resolved).await {
            Ok(b) => b,
            Err(e) => return json!({"error": format!("failed to read {path}: {e}")}),
        };

        if looks_binary(&bytes) {
            return json!({"binary": true, "total_size": bytes.len()});
        }

        let text = String::from_utf8_lossy(&bytes).into_owned();
        let bounded = bound_text(&text, max_bytes);
        json!({
            "content": bounded.clipped,
            "truncated": bounded.truncated,
            "total_size": bounded.total_size
        })
    }
}
