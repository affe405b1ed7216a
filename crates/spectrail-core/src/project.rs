//! The narrow interface RepoTools and the facade need into the external project store.
//! Project/task CRUD itself stays out of scope; this is only the lookup RepoTools needs
//! to turn a `project_id` into a filesystem root.

use crate::Result;
use std::path::PathBuf;

pub trait ProjectResolver: Send + Sync {
    /// Resolve a project id to its repository root. Fails with `RepoUnavailable` if the
    /// project is unknown or its root no longer exists.
    fn repo_path(&self, project_id: &str) -> Result<PathBuf>;
}
