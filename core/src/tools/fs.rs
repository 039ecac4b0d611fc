//! File tools: read, write, list

use crate::error::{Result, StewardError};
use crate::tool::{RiskLevel, Tool};
use crate::tools::resolve_in_root;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::fs;

#[derive(Deserialize)]
struct PathArgs {
    #[serde(default)]
    path: String,
}

#[derive(Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

fn parse_args<T: serde::de::DeserializeOwned>(tool: &str, args: &serde_json::Value) -> Result<T> {
    serde_json::from_value(args.clone()).map_err(|e| StewardError::ToolExecution {
        tool: tool.to_string(),
        error: format!("invalid arguments: {e}"),
    })
}

/// Read a file from the session workspace.
pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file in the workspace."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative file path" }
            },
            "required": ["path"]
        })
    }

    async fn call(&self, args: &serde_json::Value) -> Result<String> {
        let args: PathArgs = parse_args(self.name(), args)?;
        let path = resolve_in_root(&self.root, &args.path)?;
        fs::read_to_string(&path)
            .await
            .map_err(|e| StewardError::ToolExecution {
                tool: self.name().to_string(),
                error: format!("{}: {}", args.path, e),
            })
    }
}

/// Write a file into the session workspace. Mutation, so Medium risk.
pub struct WriteFileTool {
    root: PathBuf,
}

impl WriteFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file in the workspace."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative file path" },
                "content": { "type": "string", "description": "Full file contents" }
            },
            "required": ["path", "content"]
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Medium
    }

    async fn call(&self, args: &serde_json::Value) -> Result<String> {
        let args: WriteArgs = parse_args(self.name(), args)?;
        let path = resolve_in_root(&self.root, &args.path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| StewardError::ToolExecution {
                tool: self.name().to_string(),
                error: format!("{}: {}", args.path, e),
            })?;
        }
        fs::write(&path, args.content.as_bytes())
            .await
            .map_err(|e| StewardError::ToolExecution {
                tool: self.name().to_string(),
                error: format!("{}: {}", args.path, e),
            })?;
        Ok(format!("Wrote {} bytes to {}", args.content.len(), args.path))
    }
}

/// List directory entries in the session workspace.
pub struct ListFilesTool {
    root: PathBuf,
}

impl ListFilesTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories at a workspace path."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative directory (default: workspace root)" }
            },
            "required": []
        })
    }

    async fn call(&self, args: &serde_json::Value) -> Result<String> {
        let args: PathArgs = parse_args(self.name(), args)?;
        let path = resolve_in_root(&self.root, &args.path)?;

        let mut entries = fs::read_dir(&path).await.map_err(|e| StewardError::ToolExecution {
            tool: self.name().to_string(),
            error: format!("{}: {}", args.path, e),
        })?;

        let mut lines = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let metadata = entry.metadata().await.ok();
            let is_dir = metadata.as_ref().map(|m| m.is_dir()).unwrap_or(false);
            let size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);
            let kind = if is_dir { "DIR " } else { "FILE" };
            let size_col = if is_dir { "-".to_string() } else { format!("{size}B") };
            lines.push(format!("{} {:>10} {}", kind, size_col, entry.file_name().to_string_lossy()));
        }
        lines.sort();
        if lines.is_empty() {
            return Ok("(empty directory)".to_string());
        }
        Ok(lines.join("\n"))
    }
}
