//! Shell command execution

use crate::error::{Result, StewardError};
use crate::tool::{RiskLevel, Tool};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct ShellArgs {
    command: String,
}

/// Execute a shell command inside the session workspace. High risk: gated
/// behind human approval by the default policy.
pub struct ShellTool {
    cwd: PathBuf,
}

impl ShellTool {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace and return its output."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to execute (e.g. ls -la)" }
            },
            "required": ["command"]
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::High
    }

    async fn call(&self, args: &serde_json::Value) -> Result<String> {
        let args: ShellArgs = serde_json::from_value(args.clone()).map_err(|e| {
            StewardError::ToolExecution {
                tool: self.name().to_string(),
                error: format!("invalid arguments: {e}"),
            }
        })?;

        let parts = shell_words::split(&args.command).map_err(|e| StewardError::ToolExecution {
            tool: self.name().to_string(),
            error: format!("could not tokenize command: {e}"),
        })?;
        let Some((program, rest)) = parts.split_first() else {
            return Err(StewardError::ToolExecution {
                tool: self.name().to_string(),
                error: "empty command".to_string(),
            });
        };

        tracing::debug!(command = %args.command, cwd = %self.cwd.display(), "executing shell command");

        let output = timeout(
            COMMAND_TIMEOUT,
            Command::new(program).args(rest).current_dir(&self.cwd).output(),
        )
        .await
        .map_err(|_| StewardError::ToolTimeout {
            tool: self.name().to_string(),
            duration: COMMAND_TIMEOUT,
        })?
        .map_err(|e| StewardError::ToolExecution {
            tool: self.name().to_string(),
            error: format!("failed to spawn '{program}': {e}"),
        })?;

        let mut result = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.stderr.is_empty() {
            if !result.is_empty() {
                result.push_str("\n--- stderr ---\n");
            }
            result.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        if !output.status.success() {
            result = format!("Exit code: {:?}\n{}", output.status.code(), result);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_in_workspace() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("marker.txt"), b"x").await.unwrap();

        let tool = ShellTool::new(dir.path());
        let out = tool.call(&serde_json::json!({"command": "ls"})).await.unwrap();
        assert!(out.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_captures_failure_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ShellTool::new(dir.path());
        let out = tool
            .call(&serde_json::json!({"command": "ls missing-entry"}))
            .await
            .unwrap();
        assert!(out.starts_with("Exit code:"));
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ShellTool::new(dir.path());
        let err = tool.call(&serde_json::json!({"command": "  "})).await.unwrap_err();
        assert!(matches!(err, StewardError::ToolExecution { .. }));
    }

    #[test]
    fn test_shell_is_high_risk() {
        assert_eq!(ShellTool::new("/tmp").risk(), RiskLevel::High);
    }
}
