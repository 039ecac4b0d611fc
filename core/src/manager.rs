//! Task manager
//!
//! Owns the task table, the per-task cancellation tokens, and the broadcast
//! channel every observer subscribes to. One manager instance is shared by
//! the protocol server and every running agent loop; it is cheap to clone.

use crate::agent::{AgentConfigFactory, AgentLoop};
use crate::approval::ApprovalManager;
use crate::error::{Result, StewardError};
use crate::policy::ApprovalPolicy;
use crate::session::SessionProvider;
use crate::task::{Message, Task, TaskEvent, TaskState, TaskUpdate};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct ManagerInner {
    tasks: RwLock<HashMap<Uuid, Task>>,
    cancels: Mutex<HashMap<Uuid, CancellationToken>>,
    events: broadcast::Sender<TaskUpdate>,
    approvals: ApprovalManager,
    sessions: Arc<dyn SessionProvider>,
    policy: ApprovalPolicy,
}

#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<ManagerInner>,
}

impl TaskManager {
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        approvals: ApprovalManager,
        policy: ApprovalPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ManagerInner {
                tasks: RwLock::new(HashMap::new()),
                cancels: Mutex::new(HashMap::new()),
                events,
                approvals,
                sessions,
                policy,
            }),
        }
    }

    /// Create a task from a prompt and start its agent loop. Returns the
    /// `Submitted` snapshot immediately; progress flows through the event
    /// channel.
    pub async fn submit(&self, prompt: &str, factory: &dyn AgentConfigFactory) -> Result<Task> {
        let session = self.inner.sessions.create().await?;
        let task = Task::new(prompt, factory.runner(), session.id());
        let config = factory.build(prompt, &session);
        let cancel = CancellationToken::new();

        self.inner.tasks.write().insert(task.id, task.clone());
        self.inner.cancels.lock().insert(task.id, cancel.clone());

        tracing::info!(task_id = %task.id, runner = ?task.runner, "task submitted");

        let agent = AgentLoop::new(
            task.id,
            config,
            session,
            self.clone(),
            self.inner.approvals.clone(),
            self.inner.policy.clone(),
            cancel,
        );
        tokio::spawn(agent.run());

        Ok(task)
    }

    /// Full snapshot of one task, messages included.
    pub fn get(&self, id: Uuid) -> Option<Task> {
        self.inner.tasks.read().get(&id).cloned()
    }

    /// Request cancellation. Idempotent: cancelling a terminal task is a
    /// no-op, cancelling an unknown id is an error. Any tool call already in
    /// flight completes; no new calls start.
    pub fn cancel(&self, id: Uuid) -> Result<()> {
        let state = self
            .inner
            .tasks
            .read()
            .get(&id)
            .map(|t| t.state)
            .ok_or(StewardError::TaskNotFound { id })?;
        if state.is_terminal() {
            return Ok(());
        }

        tracing::info!(task_id = %id, "cancellation requested");
        if let Some(token) = self.inner.cancels.lock().get(&id) {
            token.cancel();
        }
        // Wakes the loop if it is parked on an approval
        self.inner.approvals.cancel_for_task(id);
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskUpdate> {
        self.inner.events.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<TaskUpdate> {
        BroadcastStream::new(self.inner.events.subscribe())
    }

    pub(crate) fn messages(&self, id: Uuid) -> Vec<Message> {
        self.inner
            .tasks
            .read()
            .get(&id)
            .map(|t| t.messages.clone())
            .unwrap_or_default()
    }

    pub(crate) fn append_message(&self, id: Uuid, message: Message) {
        let seq = {
            let mut tasks = self.inner.tasks.write();
            let Some(task) = tasks.get_mut(&id) else {
                return;
            };
            task.messages.push(message.clone());
            task.last_event_seq += 1;
            task.last_event_seq
        };
        let _ = self.inner.events.send(TaskUpdate {
            task_id: id,
            seq,
            event: TaskEvent::MessageAppended { message },
        });
    }

    pub(crate) fn set_state(&self, id: Uuid, to: TaskState) {
        let (from, seq) = {
            let mut tasks = self.inner.tasks.write();
            let Some(task) = tasks.get_mut(&id) else {
                return;
            };
            // Terminal states are final and self-transitions are not events
            if task.state.is_terminal() || task.state == to {
                return;
            }
            let from = task.state;
            task.state = to;
            if to.is_terminal() {
                task.completed_at = Some(Utc::now());
            }
            task.last_event_seq += 1;
            (from, task.last_event_seq)
        };
        if to.is_terminal() {
            self.inner.cancels.lock().remove(&id);
        }
        tracing::debug!(task_id = %id, ?from, ?to, "task state changed");
        let _ = self.inner.events.send(TaskUpdate {
            task_id: id,
            seq,
            event: TaskEvent::StateChanged { from, to },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;
    use crate::approval::TimeoutPolicy;
    use crate::llm::{LlmReply, ScriptedLlm};
    use crate::session::{DirSessionProvider, SessionHandle};
    use crate::task::RunnerKind;
    use crate::tool::ToolRegistry;
    use std::time::Duration;

    struct TextFactory {
        reply: String,
    }

    impl AgentConfigFactory for TextFactory {
        fn runner(&self) -> RunnerKind {
            RunnerKind::Content
        }

        fn build(&self, _prompt: &str, _session: &SessionHandle) -> AgentConfig {
            AgentConfig {
                name: "text-agent".to_string(),
                system_prompt: "Reply briefly.".to_string(),
                tools: ToolRegistry::new(),
                llm: Arc::new(ScriptedLlm::new(vec![LlmReply::Text(self.reply.clone())])),
                max_iterations: 3,
            }
        }
    }

    fn manager(base: &std::path::Path) -> TaskManager {
        TaskManager::new(
            Arc::new(DirSessionProvider::new(base)),
            ApprovalManager::new(TimeoutPolicy::Deny, None),
            ApprovalPolicy::new(),
        )
    }

    async fn wait_terminal(manager: &TaskManager, id: Uuid) -> Task {
        for _ in 0..500 {
            if let Some(task) = manager.get(id) {
                if task.state.is_terminal() {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task did not reach a terminal state");
    }

    #[tokio::test]
    async fn test_submit_returns_submitted_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let factory = TextFactory {
            reply: "done".to_string(),
        };

        let task = manager.submit("say done", &factory).await.unwrap();
        assert_eq!(task.state, TaskState::Submitted);
        assert_eq!(task.prompt, "say done");
        assert_eq!(task.messages.len(), 1);

        let done = wait_terminal(&manager, task.id).await;
        assert_eq!(done.state, TaskState::Completed);
        assert_eq!(done.final_message(), Some("done"));
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_events_cover_messages_and_states() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let mut events = manager.subscribe();
        let factory = TextFactory {
            reply: "hello".to_string(),
        };

        let task = manager.submit("greet", &factory).await.unwrap();
        wait_terminal(&manager, task.id).await;

        let mut appended = 0;
        let mut changes = Vec::new();
        while let Ok(update) = events.try_recv() {
            assert_eq!(update.task_id, task.id);
            match update.event {
                TaskEvent::MessageAppended { .. } => appended += 1,
                TaskEvent::StateChanged { to, .. } => changes.push(to),
            }
        }
        assert_eq!(appended, 1);
        assert_eq!(changes, vec![TaskState::Working, TaskState::Completed]);
    }

    #[tokio::test]
    async fn test_update_seq_is_monotonic_and_matches_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let mut events = manager.subscribe();
        let factory = TextFactory {
            reply: "ok".to_string(),
        };

        let task = manager.submit("count events", &factory).await.unwrap();
        let done = wait_terminal(&manager, task.id).await;

        let mut seqs = Vec::new();
        while let Ok(update) = events.try_recv() {
            seqs.push(update.seq);
        }
        let expected: Vec<u64> = (1..=seqs.len() as u64).collect();
        assert_eq!(seqs, expected);
        // The snapshot reflects every published update, so a stream reader
        // can drop anything at or below last_event_seq.
        assert_eq!(done.last_event_seq, *seqs.last().unwrap());
    }

    #[tokio::test]
    async fn test_subscribe_stream_yields_updates() {
        use tokio_stream::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let mut stream = manager.subscribe_stream();
        let factory = TextFactory {
            reply: "streamed".to_string(),
        };

        let task = manager.submit("stream me", &factory).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.task_id, task.id);
        assert_eq!(first.seq, 1);
    }

    #[tokio::test]
    async fn test_get_unknown_task() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        assert!(manager.get(Uuid::new_v4()).is_none());
    }

    #[tokio::test]
    async fn test_cancel_unknown_task_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        assert!(matches!(
            manager.cancel(Uuid::new_v4()),
            Err(StewardError::TaskNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_terminal_task_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let factory = TextFactory {
            reply: "done".to_string(),
        };
        let task = manager.submit("say done", &factory).await.unwrap();
        let done = wait_terminal(&manager, task.id).await;

        manager.cancel(task.id).unwrap();
        assert_eq!(manager.get(task.id).unwrap().state, done.state);
    }

    #[tokio::test]
    async fn test_session_allocation_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let manager = manager(&blocker);
        let factory = TextFactory {
            reply: "never".to_string(),
        };
        assert!(matches!(
            manager.submit("anything", &factory).await,
            Err(StewardError::SessionCreation { .. })
        ));
    }
}
