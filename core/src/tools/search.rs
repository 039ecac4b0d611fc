//! Workspace text search

use crate::error::{Result, StewardError};
use crate::tool::Tool;
use crate::tools::resolve_in_root;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::fs;

const MAX_MATCHES: usize = 50;
const MAX_LINE_CHARS: usize = 200;

#[derive(Deserialize)]
struct SearchArgs {
    pattern: String,
    #[serde(default)]
    path: String,
}

/// Substring search over workspace files. Read-only, auto-approved by the
/// default policy.
pub struct SearchFilesTool {
    root: PathBuf,
}

impl SearchFilesTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search workspace files for lines containing a pattern."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Substring to look for" },
                "path": { "type": "string", "description": "Workspace-relative directory to search (default: root)" }
            },
            "required": ["pattern"]
        })
    }

    async fn call(&self, args: &serde_json::Value) -> Result<String> {
        let args: SearchArgs = serde_json::from_value(args.clone()).map_err(|e| {
            StewardError::ToolExecution {
                tool: self.name().to_string(),
                error: format!("invalid arguments: {e}"),
            }
        })?;
        let start = resolve_in_root(&self.root, &args.path)?;

        let mut matches = Vec::new();
        let mut stack = vec![start];
        while let Some(dir) = stack.pop() {
            let Ok(mut entries) = fs::read_dir(&dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let Ok(content) = fs::read_to_string(&path).await else {
                    continue; // binary or unreadable, skip
                };
                let display = path
                    .strip_prefix(&self.root)
                    .unwrap_or(&path)
                    .display()
                    .to_string();
                for (line_no, line) in content.lines().enumerate() {
                    if line.contains(&args.pattern) {
                        let snippet: String = line.chars().take(MAX_LINE_CHARS).collect();
                        matches.push(format!("{}:{}:{}", display, line_no + 1, snippet));
                        if matches.len() >= MAX_MATCHES {
                            break;
                        }
                    }
                }
                if matches.len() >= MAX_MATCHES {
                    break;
                }
            }
            if matches.len() >= MAX_MATCHES {
                break;
            }
        }

        if matches.is_empty() {
            Ok(format!("No matches found for '{}'", args.pattern))
        } else {
            Ok(matches.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_finds_matches_recursively() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "alpha\nneedle here\n")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("sub/b.txt"), "another needle\n")
            .await
            .unwrap();

        let tool = SearchFilesTool::new(dir.path());
        let out = tool
            .call(&serde_json::json!({"pattern": "needle"}))
            .await
            .unwrap();
        assert!(out.contains("a.txt:2:needle here"));
        assert!(out.contains("b.txt:1:another needle"));
    }

    #[tokio::test]
    async fn test_reports_no_matches() {
        let dir = tempfile::tempdir().unwrap();
        let tool = SearchFilesTool::new(dir.path());
        let out = tool
            .call(&serde_json::json!({"pattern": "missing"}))
            .await
            .unwrap();
        assert!(out.contains("No matches"));
    }
}
