//! Row types returned by RunLog's read queries. Mirrors the entities in the data model:
//! projects and tasks are kept minimal (just enough to satisfy foreign keys and let the
//! CLI/tests exercise the facade), runs/messages/tool_calls/artifacts are the durable log.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub repo_path: String,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub mode: String,
    pub status: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub task_id: String,
    pub phase_id: Option<String>,
    pub run_type: String,
    pub provider: String,
    pub model: String,
    pub started_at: String,
    pub ended_at: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub run_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallRow {
    pub id: String,
    pub run_id: String,
    pub name: String,
    pub args_json: String,
    pub result_json: String,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub task_id: String,
    pub phase_id: Option<String>,
    pub kind: String,
    pub content: String,
    pub created_at: String,
    pub pinned: bool,
}
