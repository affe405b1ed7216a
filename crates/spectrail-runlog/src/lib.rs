//! Durable run log: SQLite-backed storage for runs, messages, tool calls and artifacts.

pub mod models;
pub mod runlog;
mod schema;

pub use models::{Artifact, MessageRow, Project, Run, Task, ToolCallRow};
pub use runlog::RunLog;
