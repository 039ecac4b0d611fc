//! Wire protocol
//!
//! JSON envelopes exchanged over the server's WebSocket transport. Every
//! client message may carry a `request_id`; the server echoes it on the
//! direct reply so callers can correlate over a multiplexed connection.
//! Streamed task updates carry the task id instead.

use crate::approval::{ApprovalDecision, PendingApproval};
use crate::card::AgentCard;
use crate::task::{Task, TaskEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PROTOCOL_VERSION: u8 = 1;

fn protocol_version() -> u8 {
    PROTOCOL_VERSION
}

/// Client -> server frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEnvelope {
    #[serde(default = "protocol_version")]
    pub v: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub message: ClientMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SubmitTask {
        prompt: String,
        /// Runner kind name; defaults to "interactive"
        #[serde(default, skip_serializing_if = "Option::is_none")]
        runner: Option<String>,
    },
    GetTask {
        task_id: Uuid,
    },
    CancelTask {
        task_id: Uuid,
    },
    /// Snapshot-then-follow subscription to one task's events
    StreamTaskUpdates {
        task_id: Uuid,
    },
    ApproveRequest {
        approval_id: Uuid,
    },
    DenyRequest {
        approval_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Approve with human-edited parameters
    ModifyRequest {
        approval_id: Uuid,
        parameters: serde_json::Map<String, serde_json::Value>,
    },
    /// Apply one decision to every pending approval for a tool
    ResolveAllMatching {
        tool: String,
        decision: ApprovalDecision,
    },
    ListApprovals,
    GetAgentCard,
}

/// Server -> client frame. `request_id` is present on direct replies,
/// `event_id` on every frame for client-side dedup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEnvelope {
    #[serde(default = "protocol_version")]
    pub v: u8,
    pub event_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub event: ServerEvent,
}

impl ServerEnvelope {
    pub fn reply(request_id: Option<String>, event: ServerEvent) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            event_id: Uuid::new_v4(),
            request_id,
            event,
        }
    }

    pub fn push(event: ServerEvent) -> Self {
        Self::reply(None, event)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    TaskSubmitted {
        task: Task,
    },
    Task {
        task: Task,
    },
    TaskCancelled {
        task_id: Uuid,
    },
    TaskUpdate {
        task_id: Uuid,
        /// Per-task sequence number for client-side dedup against the
        /// snapshot's `last_event_seq`
        seq: u64,
        event: TaskEvent,
    },
    /// Marks the end of a `stream_task_updates` subscription
    StreamClosed {
        task_id: Uuid,
    },
    ApprovalResolved {
        approval_id: Uuid,
    },
    ApprovalsResolved {
        count: usize,
    },
    Approvals {
        approvals: Vec<PendingApproval>,
    },
    AgentCard {
        card: AgentCard,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    pub fn error(err: &crate::error::StewardError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
