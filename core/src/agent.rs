//! Agent loop
//!
//! The per-task reason/act cycle. One loop instance is bound to exactly one
//! task; iterations are strictly sequential, and the loop suspends at two
//! points only: awaiting the model and awaiting approval resolution. Both
//! suspensions are raced against the task's cancellation token.

use crate::approval::{ApprovalDecision, ApprovalManager, PendingApproval};
use crate::error::{Result, StewardError};
use crate::llm::{LlmClient, LlmReply};
use crate::manager::TaskManager;
use crate::policy::ApprovalPolicy;
use crate::session::SessionHandle;
use crate::task::{Message, TaskState};
use crate::tool::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Consecutive identical tool calls tolerated before the task is failed
const MAX_REPEATED_CALLS: usize = 3;
/// Transient provider errors retried before the task is failed
const MAX_PROVIDER_RETRIES: usize = 2;

/// Immutable per-task configuration, built once by a factory at submission.
pub struct AgentConfig {
    pub name: String,
    pub system_prompt: String,
    pub tools: ToolRegistry,
    pub llm: Arc<dyn LlmClient>,
    pub max_iterations: usize,
}

/// Builds an `AgentConfig` for one submission. Selected by the task router;
/// different runner kinds plug in different tool sets and prompts.
pub trait AgentConfigFactory: Send + Sync {
    fn runner(&self) -> crate::task::RunnerKind;
    fn build(&self, prompt: &str, session: &SessionHandle) -> AgentConfig;
}

pub struct AgentLoop {
    task_id: Uuid,
    config: AgentConfig,
    session: SessionHandle,
    manager: TaskManager,
    approvals: ApprovalManager,
    policy: ApprovalPolicy,
    cancel: CancellationToken,
}

impl AgentLoop {
    pub(crate) fn new(
        task_id: Uuid,
        config: AgentConfig,
        session: SessionHandle,
        manager: TaskManager,
        approvals: ApprovalManager,
        policy: ApprovalPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            task_id,
            config,
            session,
            manager,
            approvals,
            policy,
            cancel,
        }
    }

    /// Drive the task to a terminal state.
    pub async fn run(self) {
        let task_id = self.task_id;
        tracing::info!(%task_id, agent = %self.config.name, session = %self.session.id(), "agent loop started");

        self.manager.set_state(task_id, TaskState::Working);

        let mut last_call: Option<(String, String)> = None;
        let mut repeats = 0usize;

        for iteration in 1..=self.config.max_iterations {
            if self.cancel.is_cancelled() {
                self.finish_cancelled();
                return;
            }

            let history = self.manager.messages(task_id);
            let descriptors = self.config.tools.descriptors();

            let reply = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.finish_cancelled();
                    return;
                }
                reply = self.complete_with_retry(&history, &descriptors) => reply,
            };

            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(%task_id, error = %e, "provider failure, task failed");
                    self.manager
                        .append_message(task_id, Message::assistant(format!("Error: {e}")));
                    self.manager.set_state(task_id, TaskState::Failed);
                    return;
                }
            };

            match reply {
                LlmReply::Text(text) => {
                    self.manager.append_message(task_id, Message::assistant(text));
                    self.manager.set_state(task_id, TaskState::Completed);
                    tracing::info!(%task_id, iteration, "task completed");
                    return;
                }
                LlmReply::ToolCall { name, arguments } => {
                    let fingerprint = (name.clone(), arguments.to_string());
                    if last_call.as_ref() == Some(&fingerprint) {
                        repeats += 1;
                        if repeats >= MAX_REPEATED_CALLS {
                            self.manager.append_message(
                                task_id,
                                Message::assistant(format!(
                                    "Error: repeated tool call to '{name}' with identical arguments; aborting."
                                )),
                            );
                            self.manager.set_state(task_id, TaskState::Failed);
                            return;
                        }
                    } else {
                        repeats = 0;
                        last_call = Some(fingerprint);
                    }

                    if !self.dispatch_tool(&name, arguments).await {
                        return;
                    }
                }
            }
        }

        // Budget exhausted without a final answer
        let err = StewardError::IterationLimit {
            max: self.config.max_iterations,
        };
        self.manager.append_message(
            self.task_id,
            Message::assistant(format!("Task failed ({}): {}.", err.code(), err)),
        );
        self.manager.set_state(self.task_id, TaskState::Failed);
    }

    /// Gate, execute, and record one tool call. Returns false when the loop
    /// must stop (cancellation).
    async fn dispatch_tool(&self, name: &str, arguments: serde_json::Value) -> bool {
        let task_id = self.task_id;

        let Some(tool) = self.config.tools.get(name) else {
            // Let the model see its mistake and recover on the next turn
            let err = StewardError::ToolNotFound {
                tool: name.to_string(),
            };
            self.manager.append_message(
                task_id,
                Message::tool(format!(
                    "Error: {}. Available tools: {}",
                    err,
                    self.config.tools.names().join(", ")
                )),
            );
            return true;
        };

        let mut parameters = match arguments {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("args".to_string(), other);
                map
            }
        };

        if self.policy.requires_approval(name, tool.risk()) {
            let pending = PendingApproval::new(
                task_id,
                self.config.name.clone(),
                name,
                parameters.clone(),
                tool.risk(),
            );
            let approval_id = pending.id;

            let rx = match self.approvals.register(pending) {
                Ok(rx) => rx,
                Err(e) => {
                    self.manager
                        .append_message(task_id, Message::assistant(format!("Error: {e}")));
                    self.manager.set_state(task_id, TaskState::Failed);
                    return false;
                }
            };

            tracing::info!(%task_id, %approval_id, tool = name, risk = ?tool.risk(), "awaiting approval");
            self.manager.set_state(task_id, TaskState::InputRequired);

            let decision = tokio::select! {
                _ = self.cancel.cancelled() => {
                    // The manager resolves our pending approval as cancelled
                    self.finish_cancelled();
                    return false;
                }
                decision = rx => decision.unwrap_or(ApprovalDecision::Cancelled),
            };

            match decision {
                ApprovalDecision::Approve => {
                    self.manager.append_message(
                        task_id,
                        Message::tool(format!("Approval granted for '{name}'.")),
                    );
                    self.manager.set_state(task_id, TaskState::Working);
                }
                ApprovalDecision::Modify { parameters: edited } => {
                    parameters = edited;
                    self.manager.append_message(
                        task_id,
                        Message::tool(format!(
                            "Approval granted for '{name}' with modified parameters."
                        )),
                    );
                    self.manager.set_state(task_id, TaskState::Working);
                }
                ApprovalDecision::Deny { reason } => {
                    let reason = reason
                        .map(|r| format!(" Reason: {r}."))
                        .unwrap_or_default();
                    self.manager.append_message(
                        task_id,
                        Message::tool(format!(
                            "Tool call '{name}' was denied by the user.{reason} Do not execute it; adjust your approach or finish with what you have."
                        )),
                    );
                    self.manager.set_state(task_id, TaskState::Working);
                    return true;
                }
                ApprovalDecision::Cancelled => {
                    self.finish_cancelled();
                    return false;
                }
            }
        }

        // A call already in flight is allowed to complete even if the task
        // gets cancelled meanwhile; the loop stops before the next iteration.
        let observation = match tool.call(&serde_json::Value::Object(parameters)).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(%task_id, tool = name, error = %e, "tool call failed");
                format!("Error: {e}. Analyze the failure and try a different approach.")
            }
        };
        self.manager.append_message(task_id, Message::tool(observation));
        true
    }

    async fn complete_with_retry(
        &self,
        history: &[Message],
        descriptors: &[crate::tool::ToolDescriptor],
    ) -> Result<LlmReply> {
        let mut attempt = 0;
        loop {
            match self
                .config
                .llm
                .complete(&self.config.system_prompt, history, descriptors)
                .await
            {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && attempt < MAX_PROVIDER_RETRIES => {
                    attempt += 1;
                    tracing::warn!(task_id = %self.task_id, error = %e, attempt, "transient provider error, retrying");
                    tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn finish_cancelled(&self) {
        tracing::info!(task_id = %self.task_id, "task cancelled");
        self.manager
            .append_message(self.task_id, Message::assistant("Task cancelled."));
        self.manager.set_state(self.task_id, TaskState::Cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::TimeoutPolicy;
    use crate::llm::ScriptedLlm;
    use crate::session::DirSessionProvider;
    use crate::task::{RunnerKind, Task, TaskEvent};
    use crate::tool::{RiskLevel, Tool};
    use crate::tools::ListFilesTool;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts executions; stands in for any gated or ungated tool.
    struct RecordingTool {
        name: &'static str,
        risk: RiskLevel,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for RecordingTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "records invocations"
        }

        fn risk(&self) -> RiskLevel {
            self.risk
        }

        async fn call(&self, _args: &serde_json::Value) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("recorded".to_string())
        }
    }

    struct TestFactory {
        llm: Arc<dyn LlmClient>,
        tools: Vec<Arc<dyn Tool>>,
        max_iterations: usize,
    }

    impl AgentConfigFactory for TestFactory {
        fn runner(&self) -> RunnerKind {
            RunnerKind::Interactive
        }

        fn build(&self, _prompt: &str, _session: &SessionHandle) -> AgentConfig {
            let mut registry = ToolRegistry::new();
            for tool in &self.tools {
                registry.register(tool.clone());
            }
            AgentConfig {
                name: "test-agent".to_string(),
                system_prompt: "You are a test agent.".to_string(),
                tools: registry,
                llm: self.llm.clone(),
                max_iterations: self.max_iterations,
            }
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        manager: TaskManager,
        approvals: ApprovalManager,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let approvals = ApprovalManager::new(TimeoutPolicy::Deny, None);
        let manager = TaskManager::new(
            Arc::new(DirSessionProvider::new(dir.path())),
            approvals.clone(),
            ApprovalPolicy::new(),
        );
        Harness {
            _dir: dir,
            manager,
            approvals,
        }
    }

    async fn wait_until(mut probe: impl FnMut() -> bool) {
        for _ in 0..500 {
            if probe() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met within 5s");
    }

    async fn wait_terminal(manager: &TaskManager, id: Uuid) -> Task {
        wait_until(|| manager.get(id).map(|t| t.state.is_terminal()).unwrap_or(false)).await;
        manager.get(id).unwrap()
    }

    #[tokio::test]
    async fn test_scenario_a_auto_approved_listing() {
        let h = harness();
        let mut events = h.manager.subscribe();

        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("hello.txt"), b"x").await.unwrap();

        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedLlm::tool_call("list_files", serde_json::json!({})),
            LlmReply::Text("The workspace contains hello.txt".to_string()),
        ]));
        let factory = TestFactory {
            llm,
            tools: vec![Arc::new(ListFilesTool::new(dir.path()))],
            max_iterations: 5,
        };

        let task = h.manager.submit("list files in /tmp", &factory).await.unwrap();
        let done = wait_terminal(&h.manager, task.id).await;

        assert_eq!(done.state, TaskState::Completed);
        assert!(done.final_message().unwrap().contains("hello.txt"));
        assert!(h.approvals.list().is_empty());

        // submitted -> working -> completed, never input_required
        let mut states = vec![TaskState::Submitted];
        while let Ok(update) = events.try_recv() {
            if let TaskEvent::StateChanged { to, .. } = update.event {
                states.push(to);
            }
        }
        assert_eq!(
            states,
            vec![TaskState::Submitted, TaskState::Working, TaskState::Completed]
        );
    }

    #[tokio::test]
    async fn test_scenario_b_approved_shell_call() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));

        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedLlm::tool_call("execute_command", serde_json::json!({"command": "uname -a"})),
            LlmReply::Text("Done.".to_string()),
        ]));
        let factory = TestFactory {
            llm,
            tools: vec![Arc::new(RecordingTool {
                name: "execute_command",
                risk: RiskLevel::High,
                calls: calls.clone(),
            })],
            max_iterations: 5,
        };

        let task = h.manager.submit("run uname", &factory).await.unwrap();

        wait_until(|| !h.approvals.list().is_empty()).await;
        let pending = h.approvals.list();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].risk, RiskLevel::High);
        assert_eq!(pending[0].task_id, task.id);
        assert_eq!(
            h.manager.get(task.id).unwrap().state,
            TaskState::InputRequired
        );
        // Gated tool must not run before resolution
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        h.approvals
            .resolve(pending[0].id, ApprovalDecision::Approve)
            .unwrap();

        let done = wait_terminal(&h.manager, task.id).await;
        assert_eq!(done.state, TaskState::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scenario_c_denied_shell_never_executes() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));

        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedLlm::tool_call("execute_command", serde_json::json!({"command": "rm -rf /"})),
            LlmReply::Text("Understood, I will not run that.".to_string()),
        ]));
        let factory = TestFactory {
            llm,
            tools: vec![Arc::new(RecordingTool {
                name: "execute_command",
                risk: RiskLevel::High,
                calls: calls.clone(),
            })],
            max_iterations: 5,
        };

        let task = h.manager.submit("clean the disk", &factory).await.unwrap();
        wait_until(|| !h.approvals.list().is_empty()).await;
        let pending = h.approvals.list();
        h.approvals
            .resolve(
                pending[0].id,
                ApprovalDecision::Deny {
                    reason: Some("not safe".to_string()),
                },
            )
            .unwrap();

        let done = wait_terminal(&h.manager, task.id).await;
        assert_eq!(done.state, TaskState::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(done
            .messages
            .iter()
            .any(|m| m.content.contains("denied") && m.content.contains("not safe")));
    }

    #[tokio::test]
    async fn test_scenario_d_iteration_limit() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));

        let llm = Arc::new(
            ScriptedLlm::new(vec![]).with_repeat(ScriptedLlm::tool_call(
                "probe",
                serde_json::json!({"n": 1}),
            )),
        );
        let factory = TestFactory {
            llm,
            tools: vec![Arc::new(RecordingTool {
                name: "probe",
                risk: RiskLevel::Low,
                calls: calls.clone(),
            })],
            max_iterations: 3,
        };

        let task = h.manager.submit("never finishes", &factory).await.unwrap();
        let done = wait_terminal(&h.manager, task.id).await;

        assert_eq!(done.state, TaskState::Failed);
        assert!(done.final_message().unwrap().contains("iteration_limit"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_modified_parameters_reach_the_tool() {
        struct CaptureTool {
            seen: Arc<parking_lot::Mutex<Option<serde_json::Value>>>,
        }

        #[async_trait]
        impl Tool for CaptureTool {
            fn name(&self) -> &str {
                "write_file"
            }
            fn description(&self) -> &str {
                "captures args"
            }
            fn risk(&self) -> RiskLevel {
                RiskLevel::Medium
            }
            async fn call(&self, args: &serde_json::Value) -> Result<String> {
                *self.seen.lock() = Some(args.clone());
                Ok("ok".to_string())
            }
        }

        let h = harness();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedLlm::tool_call("write_file", serde_json::json!({"path": "a", "content": "x"})),
            LlmReply::Text("written".to_string()),
        ]));
        let factory = TestFactory {
            llm,
            tools: vec![Arc::new(CaptureTool { seen: seen.clone() })],
            max_iterations: 5,
        };

        let task = h.manager.submit("write a file", &factory).await.unwrap();
        wait_until(|| !h.approvals.list().is_empty()).await;
        let pending = h.approvals.list();

        let mut edited = serde_json::Map::new();
        edited.insert("path".to_string(), serde_json::json!("b"));
        edited.insert("content".to_string(), serde_json::json!("y"));
        h.approvals
            .resolve(pending[0].id, ApprovalDecision::Modify { parameters: edited })
            .unwrap();

        let done = wait_terminal(&h.manager, task.id).await;
        assert_eq!(done.state, TaskState::Completed);
        let captured = seen.lock().clone().unwrap();
        assert_eq!(captured["path"], "b");
        assert_eq!(captured["content"], "y");
    }

    #[tokio::test]
    async fn test_cancel_while_awaiting_approval() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));

        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::tool_call(
            "execute_command",
            serde_json::json!({"command": "sleep 100"}),
        )]));
        let factory = TestFactory {
            llm,
            tools: vec![Arc::new(RecordingTool {
                name: "execute_command",
                risk: RiskLevel::High,
                calls: calls.clone(),
            })],
            max_iterations: 5,
        };

        let task = h.manager.submit("long job", &factory).await.unwrap();
        wait_until(|| !h.approvals.list().is_empty()).await;

        h.manager.cancel(task.id).unwrap();
        let done = wait_terminal(&h.manager, task.id).await;

        assert_eq!(done.state, TaskState::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(h.approvals.list().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_recovers() {
        let h = harness();
        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedLlm::tool_call("made_up_tool", serde_json::json!({})),
            LlmReply::Text("Falling back to a plain answer.".to_string()),
        ]));
        let factory = TestFactory {
            llm,
            tools: vec![],
            max_iterations: 5,
        };

        let task = h.manager.submit("use a tool", &factory).await.unwrap();
        let done = wait_terminal(&h.manager, task.id).await;

        assert_eq!(done.state, TaskState::Completed);
        assert!(done
            .messages
            .iter()
            .any(|m| m.content.contains("tool not found: made_up_tool")));
    }

    #[tokio::test]
    async fn test_transient_provider_error_is_retried() {
        // One 503 from the backend, then a normal answer
        struct FlakyLlm {
            failures: AtomicUsize,
            calls: AtomicUsize,
        }

        #[async_trait]
        impl LlmClient for FlakyLlm {
            async fn complete(
                &self,
                _system_prompt: &str,
                _history: &[Message],
                _tools: &[crate::tool::ToolDescriptor],
            ) -> Result<LlmReply> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.failures.load(Ordering::SeqCst) > 0 {
                    self.failures.fetch_sub(1, Ordering::SeqCst);
                    return Err(StewardError::Provider {
                        status: 503,
                        message: "overloaded".to_string(),
                    });
                }
                Ok(LlmReply::Text("recovered".to_string()))
            }
        }

        let h = harness();
        let llm = Arc::new(FlakyLlm {
            failures: AtomicUsize::new(1),
            calls: AtomicUsize::new(0),
        });
        let factory = TestFactory {
            llm: llm.clone(),
            tools: vec![],
            max_iterations: 3,
        };

        let task = h.manager.submit("flaky backend", &factory).await.unwrap();
        let done = wait_terminal(&h.manager, task.id).await;

        assert_eq!(done.state, TaskState::Completed);
        assert_eq!(done.final_message(), Some("recovered"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fatal_provider_error_fails_task() {
        let h = harness();
        // Exhausted script returns a non-retryable provider error
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let factory = TestFactory {
            llm,
            tools: vec![],
            max_iterations: 5,
        };

        let task = h.manager.submit("anything", &factory).await.unwrap();
        let done = wait_terminal(&h.manager, task.id).await;

        assert_eq!(done.state, TaskState::Failed);
        assert!(done.final_message().unwrap().contains("provider error"));
    }

    #[tokio::test]
    async fn test_repeated_identical_calls_abort() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));
        let llm = Arc::new(
            ScriptedLlm::new(vec![]).with_repeat(ScriptedLlm::tool_call(
                "probe",
                serde_json::json!({"same": true}),
            )),
        );
        let factory = TestFactory {
            llm,
            tools: vec![Arc::new(RecordingTool {
                name: "probe",
                risk: RiskLevel::Low,
                calls: calls.clone(),
            })],
            max_iterations: 50,
        };

        let task = h.manager.submit("loops forever", &factory).await.unwrap();
        let done = wait_terminal(&h.manager, task.id).await;

        assert_eq!(done.state, TaskState::Failed);
        assert!(done.final_message().unwrap().contains("repeated tool call"));
        // Aborted well before the 50-iteration budget
        assert!(calls.load(Ordering::SeqCst) < 10);
    }
}
