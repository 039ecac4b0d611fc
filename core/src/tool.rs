//! Tool trait and registry
//!
//! Tools are the agent's only way to act on the world. Each tool carries a
//! static risk classification that drives the approval policy.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Static classification of a tool call's potential impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// A trait for tools that can be executed by the agent loop.
///
/// Tools must be `Send + Sync`; one task never runs two tool calls
/// concurrently, but many tasks share the same tool instances.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The name of the tool (e.g., "execute_command")
    fn name(&self) -> &str;

    /// A brief description of what the tool does, surfaced to the model
    fn description(&self) -> &str;

    /// JSON schema for tool parameters
    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// Static risk classification driving the approval gate
    fn risk(&self) -> RiskLevel {
        RiskLevel::Low
    }

    /// Execute the tool with the provided arguments
    async fn call(&self, args: &serde_json::Value) -> Result<String>;
}

/// Descriptor handed to the language model alongside the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub risk: RiskLevel,
}

/// Tool registry: maps tool names to executable capabilities.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Descriptors for every registered tool, sorted by name so the prompt
    /// assembly is deterministic.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut out: Vec<ToolDescriptor> = self
            .tools
            .values()
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
                risk: t.risk(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}
