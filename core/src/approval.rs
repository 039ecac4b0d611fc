//! Approval manager
//!
//! Maintains the set of pending human-approval requests and resolves each one
//! exactly once. The pending map and the archive of resolved ids live behind
//! a single lock, which is what makes "first resolution wins" race-free: a
//! resolution removes the entry under the lock, and every later attempt on
//! the same id finds it in the archive.

use crate::error::{Result, StewardError};
use crate::tool::RiskLevel;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

/// An outstanding request for human sign-off on one gated tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub id: Uuid,
    pub task_id: Uuid,
    pub agent: String,
    pub tool: String,
    pub description: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub risk: RiskLevel,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl PendingApproval {
    pub fn new(
        task_id: Uuid,
        agent: impl Into<String>,
        tool: impl Into<String>,
        parameters: serde_json::Map<String, serde_json::Value>,
        risk: RiskLevel,
    ) -> Self {
        let tool = tool.into();
        Self {
            id: Uuid::new_v4(),
            task_id,
            agent: agent.into(),
            description: format!("Approve call to '{}'?", tool),
            tool,
            parameters,
            risk,
            created_at: Utc::now(),
            timeout_secs: None,
        }
    }
}

/// How a pending approval was resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Deny {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Modify {
        parameters: serde_json::Map<String, serde_json::Value>,
    },
    /// The owning task was cancelled; distinct from an explicit denial
    Cancelled,
}

/// Applied when an approval sits unresolved past its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    #[default]
    Deny,
    Approve,
}

impl TimeoutPolicy {
    fn decision(&self) -> ApprovalDecision {
        match self {
            Self::Deny => ApprovalDecision::Deny {
                reason: Some("approval timed out".to_string()),
            },
            Self::Approve => ApprovalDecision::Approve,
        }
    }
}

struct Entry {
    record: PendingApproval,
    waker: oneshot::Sender<ApprovalDecision>,
}

#[derive(Default)]
struct State {
    pending: HashMap<Uuid, Entry>,
    resolved: HashSet<Uuid>,
}

struct Inner {
    state: Mutex<State>,
    on_timeout: TimeoutPolicy,
    default_timeout: Option<Duration>,
}

#[derive(Clone)]
pub struct ApprovalManager {
    inner: Arc<Inner>,
}

impl ApprovalManager {
    pub fn new(on_timeout: TimeoutPolicy, default_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                on_timeout,
                default_timeout,
            }),
        }
    }

    /// Insert a request into the pending set and get the receiver the waiting
    /// agent loop suspends on. The sender side fires exactly once, on
    /// resolution.
    pub fn register(&self, mut record: PendingApproval) -> Result<oneshot::Receiver<ApprovalDecision>> {
        if record.timeout_secs.is_none() {
            record.timeout_secs = self.inner.default_timeout.map(|d| d.as_secs());
        }

        let (tx, rx) = oneshot::channel();
        let id = record.id;
        let timeout = record.timeout_secs;
        {
            let mut state = self.inner.state.lock();
            if state.pending.contains_key(&id) || state.resolved.contains(&id) {
                return Err(StewardError::DuplicateApproval { id });
            }
            state.pending.insert(id, Entry { record, waker: tx });
        }

        if let Some(secs) = timeout {
            let manager = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                let decision = manager.inner.on_timeout.decision();
                // Losing to a genuine resolution is the expected outcome here
                if manager.resolve(id, decision).is_ok() {
                    tracing::warn!(approval_id = %id, "approval unresolved past timeout, default policy applied");
                }
            });
        }

        Ok(rx)
    }

    /// Resolve one approval. First caller wins; later calls on the same id
    /// fail with `AlreadyResolved`.
    pub fn resolve(&self, id: Uuid, decision: ApprovalDecision) -> Result<()> {
        let entry = {
            let mut state = self.inner.state.lock();
            match state.pending.remove(&id) {
                Some(entry) => {
                    state.resolved.insert(id);
                    entry
                }
                None if state.resolved.contains(&id) => {
                    return Err(StewardError::AlreadyResolved { id });
                }
                None => return Err(StewardError::ApprovalNotFound { id }),
            }
        };
        tracing::info!(approval_id = %id, tool = %entry.record.tool, ?decision, "approval resolved");
        // Receiver may be gone if the task was torn down; nothing to do then
        let _ = entry.waker.send(decision);
        Ok(())
    }

    /// Resolve every pending approval whose tool matches, atomically with
    /// respect to concurrent individual resolutions: ids resolved in the
    /// meantime are simply no longer in the pending set and are skipped.
    pub fn resolve_all_matching(&self, tool: &str, decision: ApprovalDecision) -> usize {
        let drained: Vec<Entry> = {
            let mut state = self.inner.state.lock();
            let ids: Vec<Uuid> = state
                .pending
                .iter()
                .filter(|(_, e)| e.record.tool == tool)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| {
                    state.resolved.insert(id);
                    state.pending.remove(&id)
                })
                .collect()
        };
        let count = drained.len();
        for entry in drained {
            tracing::info!(approval_id = %entry.record.id, tool, "approval bulk-resolved");
            let _ = entry.waker.send(decision.clone());
        }
        count
    }

    /// Resolve every pending approval belonging to a task as `Cancelled`.
    pub fn cancel_for_task(&self, task_id: Uuid) -> usize {
        let drained: Vec<Entry> = {
            let mut state = self.inner.state.lock();
            let ids: Vec<Uuid> = state
                .pending
                .iter()
                .filter(|(_, e)| e.record.task_id == task_id)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| {
                    state.resolved.insert(id);
                    state.pending.remove(&id)
                })
                .collect()
        };
        let count = drained.len();
        for entry in drained {
            let _ = entry.waker.send(ApprovalDecision::Cancelled);
        }
        count
    }

    /// Snapshot of currently pending approvals, oldest first.
    pub fn list(&self) -> Vec<PendingApproval> {
        let state = self.inner.state.lock();
        let mut records: Vec<PendingApproval> =
            state.pending.values().map(|e| e.record.clone()).collect();
        records.sort_by_key(|r| r.created_at);
        records
    }
}

impl Default for ApprovalManager {
    fn default() -> Self {
        Self::new(TimeoutPolicy::Deny, None)
    }
}
