//! Task lifecycle data model
//!
//! A `Task` is one submitted prompt and its full execution record through to
//! a terminal state. Tasks are never deleted; terminal tasks are retained for
//! history and the message sequence is append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle states of a task.
///
/// `Submitted` and `Working` are transient; `InputRequired` means the agent
/// loop is suspended on an unresolved approval. No transitions leave a
/// terminal state - a retry is a brand-new task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Execution style selected for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    /// CLI-style agent with the full tool set, shell included
    Interactive,
    /// Research/writing agent restricted to read and search tools
    Content,
}

impl FromStr for RunnerKind {
    type Err = crate::error::StewardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interactive" => Ok(Self::Interactive),
            "content" => Ok(Self::Content),
            other => Err(crate::error::StewardError::UnsupportedRunner {
                runner: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

/// One entry in a task's conversation record. Immutable once appended;
/// append order is the single source of truth for replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Tool, content)
    }
}

/// The full record of one submitted prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub prompt: String,
    pub state: TaskState,
    pub session_id: Uuid,
    pub runner: RunnerKind,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub messages: Vec<Message>,
    /// Sequence number of the last published update reflected in this
    /// snapshot; streams dedupe replayed events against it.
    #[serde(default)]
    pub last_event_seq: u64,
}

impl Task {
    /// Create a fresh task in `Submitted` state with the prompt as the
    /// opening user message.
    pub fn new(prompt: impl Into<String>, runner: RunnerKind, session_id: Uuid) -> Self {
        let prompt = prompt.into();
        Self {
            id: Uuid::new_v4(),
            state: TaskState::Submitted,
            session_id,
            runner,
            created_at: Utc::now(),
            completed_at: None,
            messages: vec![Message::user(prompt.clone())],
            last_event_seq: 0,
            prompt,
        }
    }

    /// Last message content, used to surface failure reasons to callers.
    pub fn final_message(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }
}

/// A lifecycle event published by the task manager. Any number of observers
/// (the protocol server's streaming surface, a log shipper) may subscribe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    MessageAppended { message: Message },
    StateChanged { from: TaskState, to: TaskState },
}

/// `(taskId, seq, event)` carried on the manager's broadcast channel. `seq`
/// starts at 1 and is strictly increasing per task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub task_id: Uuid,
    pub seq: u64,
    pub event: TaskEvent,
}
