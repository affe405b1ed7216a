//! Repo tool executor — the fixed, frozen set of read-only/allow-listed tools the agent loop
//! may call against a project's repository.
//!
//! Each tool is a self-contained file in `src/tools/`. To add a tool: create the file,
//! implement the `Tool` trait, register it in `build_registry()` below.

pub mod registry;
pub mod tools;

pub use registry::{Tool, ToolRegistry};

use std::sync::Arc;

use spectrail_core::ProjectResolver;

/// Builds the registry with every frozen tool registered (§4.4's seven operations). There is
/// no policy-scoped subset — the allow-list itself is the only narrowing surface.
pub fn build_registry(resolver: Arc<dyn ProjectResolver>) -> ToolRegistry {
    let mut registry = ToolRegistry::new(resolver);

    registry.register(tools::list_files::ListFilesTool::new());
    registry.register(tools::read_file::ReadFileTool::new());
    registry.register(tools::grep::GrepTool::new());
    registry.register(tools::git::GitStatusTool::new());
    registry.register(tools::git::GitDiffTool::new());
    registry.register(tools::git::GitLogShortTool::new());
    registry.register(tools::run_command::RunCommandTool::new());

    registry
}
