//! Concrete tool implementations
//!
//! All file-oriented tools resolve paths inside the task's session workspace;
//! a task can never reach outside the root it was given.

use crate::error::{Result, StewardError};
use std::path::{Component, Path, PathBuf};

pub mod fs;
pub mod search;
pub mod shell;

pub use fs::{ListFilesTool, ReadFileTool, WriteFileTool};
pub use search::SearchFilesTool;
pub use shell::ShellTool;

/// Resolve a tool-supplied path against the session root, rejecting absolute
/// paths and parent-directory escapes.
pub(crate) fn resolve_in_root(root: &Path, requested: &str) -> Result<PathBuf> {
    let requested = requested.trim();
    let candidate = Path::new(requested);
    if candidate.is_absolute() {
        return Err(StewardError::ToolExecution {
            tool: "path".to_string(),
            error: format!("absolute paths are not allowed: {requested}"),
        });
    }
    for component in candidate.components() {
        if matches!(component, Component::ParentDir) {
            return Err(StewardError::ToolExecution {
                tool: "path".to_string(),
                error: format!("path escapes the session workspace: {requested}"),
            });
        }
    }
    Ok(root.join(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_relative_paths() {
        let root = Path::new("/work/session");
        let resolved = resolve_in_root(root, "notes/todo.txt").unwrap();
        assert_eq!(resolved, root.join("notes/todo.txt"));
    }

    #[test]
    fn test_rejects_escapes() {
        let root = Path::new("/work/session");
        assert!(resolve_in_root(root, "/etc/passwd").is_err());
        assert!(resolve_in_root(root, "../outside").is_err());
        assert!(resolve_in_root(root, "a/../../outside").is_err());
    }
}
