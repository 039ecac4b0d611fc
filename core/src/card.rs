//! Agent capability discovery document
//!
//! Constructed once at server start and immutable thereafter.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub streaming: bool,
    pub push_notifications: bool,
    pub state_transition_history: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub version: String,
    pub capabilities: AgentCapabilities,
    pub skills: Vec<AgentSkill>,
}

impl AgentCard {
    /// The card for this deployment: streaming updates supported, no push
    /// notifications, streams restart from the current snapshot.
    pub fn for_this_server(version: impl Into<String>) -> Self {
        Self {
            name: "steward".to_string(),
            description: "Agent task orchestration with human-in-the-loop approvals".to_string(),
            version: version.into(),
            capabilities: AgentCapabilities {
                streaming: true,
                push_notifications: false,
                state_transition_history: false,
            },
            skills: vec![
                AgentSkill {
                    id: "interactive".to_string(),
                    name: "Interactive tasks".to_string(),
                    description: "Shell-capable agent for operational work in an isolated workspace"
                        .to_string(),
                    tags: vec!["shell".to_string(), "files".to_string()],
                    examples: vec!["list files in /tmp".to_string(), "run the test suite".to_string()],
                },
                AgentSkill {
                    id: "content".to_string(),
                    name: "Content tasks".to_string(),
                    description: "Read/search-only agent for research and writing".to_string(),
                    tags: vec!["research".to_string(), "writing".to_string()],
                    examples: vec!["summarize the notes in this workspace".to_string()],
                },
            ],
        }
    }
}
