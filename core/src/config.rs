//! Configuration management
//!
//! YAML file with defaults for everything, so a missing config file still
//! yields a runnable server against a local OpenAI-compatible endpoint.

use crate::approval::TimeoutPolicy;
use crate::error::{Result, StewardError};
use crate::llm::http::LlmEndpoint;
use crate::policy::ApprovalPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8787 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_iterations: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self { max_iterations: 15 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApprovalSettings {
    /// Unresolved approvals older than this get the timeout policy applied.
    /// None means approvals wait indefinitely for a human.
    pub timeout_secs: Option<u64>,
    pub on_timeout: TimeoutPolicy,
    /// Tool names always auto-approved, overriding their risk level
    pub auto_approve: Vec<String>,
    /// Tool names always gated, overriding their risk level
    pub require_approval: Vec<String>,
}

impl ApprovalSettings {
    pub fn policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::from_lists(&self.auto_approve, &self.require_approval)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Base directory for per-task workspaces; defaults to the platform
    /// data dir.
    pub root: Option<PathBuf>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { root: None }
    }
}

impl SessionSettings {
    pub fn root_dir(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("steward")
                .join("sessions")
        })
    }
}

fn default_endpoint() -> LlmEndpoint {
    LlmEndpoint {
        base_url: "http://localhost:11434/v1".to_string(),
        model: "llama3".to_string(),
        api_key: None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmEndpoint,
    pub agent: AgentSettings,
    pub approvals: ApprovalSettings,
    pub sessions: SessionSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            llm: default_endpoint(),
            agent: AgentSettings::default(),
            approvals: ApprovalSettings::default(),
            sessions: SessionSettings::default(),
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_yml::from_str(&raw).map_err(|e| StewardError::InvalidConfig {
            message: format!("{}: {}", path.display(), e),
        })
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("steward").join("config.yml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_runnable() {
        let config = Config::default();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.agent.max_iterations, 15);
        assert_eq!(config.approvals.on_timeout, TimeoutPolicy::Deny);
        assert!(config.approvals.timeout().is_none());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: Config = serde_yml::from_str(
            "server:\n  port: 9000\napprovals:\n  timeout_secs: 120\n  auto_approve: [execute_command]\n",
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.approvals.timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.agent.max_iterations, 15);

        let policy = config.approvals.policy();
        assert!(!policy.requires_approval("execute_command", crate::tool::RiskLevel::High));
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "server: [not, a, map]").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(StewardError::InvalidConfig { .. })
        ));
    }
}
