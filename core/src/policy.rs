//! Risk-approval policy
//!
//! Maps each tool to "auto-approve" or "require-approval". Read/search-style
//! tools (Low risk) default to auto-approve; mutation and execution tools
//! default to require-approval. Per-deployment overrides by tool name win
//! over the risk default.

use crate::tool::RiskLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    AutoApprove,
    RequireApproval,
}

#[derive(Debug, Clone, Default)]
pub struct ApprovalPolicy {
    overrides: HashMap<String, PolicyAction>,
}

impl ApprovalPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, tool: impl Into<String>, action: PolicyAction) -> Self {
        self.overrides.insert(tool.into(), action);
        self
    }

    pub fn from_lists(auto_approve: &[String], require_approval: &[String]) -> Self {
        let mut policy = Self::new();
        for name in auto_approve {
            policy.overrides.insert(name.clone(), PolicyAction::AutoApprove);
        }
        // require-approval entries win on conflict
        for name in require_approval {
            policy.overrides.insert(name.clone(), PolicyAction::RequireApproval);
        }
        policy
    }

    /// Does a call to this tool need a human in the loop?
    pub fn requires_approval(&self, tool: &str, risk: RiskLevel) -> bool {
        match self.overrides.get(tool) {
            Some(PolicyAction::AutoApprove) => false,
            Some(PolicyAction::RequireApproval) => true,
            None => risk >= RiskLevel::Medium,
        }
    }
}
