//! Runner selection
//!
//! Maps a requested runner kind to the factory that builds its agent
//! configuration. The interactive runner carries the full tool set, shell
//! included; the content runner is restricted to read and search tools so it
//! can run largely unattended.

use crate::agent::{AgentConfig, AgentConfigFactory};
use crate::error::{Result, StewardError};
use crate::llm::LlmClient;
use crate::session::SessionHandle;
use crate::task::RunnerKind;
use crate::tool::ToolRegistry;
use crate::tools::{ListFilesTool, ReadFileTool, SearchFilesTool, ShellTool, WriteFileTool};
use std::collections::HashMap;
use std::sync::Arc;

const INTERACTIVE_PROMPT: &str = "\
You are an operations agent working inside an isolated workspace directory. \
Use the available tools to carry out the user's request. Call one tool at a \
time and wait for its result. When the request is fulfilled, reply with a \
plain-text summary of what you did.";

const CONTENT_PROMPT: &str = "\
You are a research and writing agent. You may read, list, and search files \
in the workspace but you cannot modify anything. Gather what you need, then \
reply with the finished text.";

pub struct InteractiveConfigFactory {
    llm: Arc<dyn LlmClient>,
    max_iterations: usize,
}

impl InteractiveConfigFactory {
    pub fn new(llm: Arc<dyn LlmClient>, max_iterations: usize) -> Self {
        Self { llm, max_iterations }
    }
}

impl AgentConfigFactory for InteractiveConfigFactory {
    fn runner(&self) -> RunnerKind {
        RunnerKind::Interactive
    }

    fn build(&self, _prompt: &str, session: &SessionHandle) -> AgentConfig {
        let root = session.root();
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(ReadFileTool::new(root)));
        tools.register(Arc::new(WriteFileTool::new(root)));
        tools.register(Arc::new(ListFilesTool::new(root)));
        tools.register(Arc::new(SearchFilesTool::new(root)));
        tools.register(Arc::new(ShellTool::new(root)));
        AgentConfig {
            name: "interactive".to_string(),
            system_prompt: INTERACTIVE_PROMPT.to_string(),
            tools,
            llm: self.llm.clone(),
            max_iterations: self.max_iterations,
        }
    }
}

pub struct ContentConfigFactory {
    llm: Arc<dyn LlmClient>,
    max_iterations: usize,
}

impl ContentConfigFactory {
    pub fn new(llm: Arc<dyn LlmClient>, max_iterations: usize) -> Self {
        Self { llm, max_iterations }
    }
}

impl AgentConfigFactory for ContentConfigFactory {
    fn runner(&self) -> RunnerKind {
        RunnerKind::Content
    }

    fn build(&self, _prompt: &str, session: &SessionHandle) -> AgentConfig {
        let root = session.root();
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(ReadFileTool::new(root)));
        tools.register(Arc::new(ListFilesTool::new(root)));
        tools.register(Arc::new(SearchFilesTool::new(root)));
        AgentConfig {
            name: "content".to_string(),
            system_prompt: CONTENT_PROMPT.to_string(),
            tools,
            llm: self.llm.clone(),
            max_iterations: self.max_iterations,
        }
    }
}

/// Registry of the runner kinds this deployment accepts.
pub struct TaskRouter {
    factories: HashMap<RunnerKind, Arc<dyn AgentConfigFactory>>,
}

impl TaskRouter {
    /// Router with both stock runners wired to one LLM client.
    pub fn with_defaults(llm: Arc<dyn LlmClient>, max_iterations: usize) -> Self {
        let mut router = Self {
            factories: HashMap::new(),
        };
        router.register(Arc::new(InteractiveConfigFactory::new(llm.clone(), max_iterations)));
        router.register(Arc::new(ContentConfigFactory::new(llm, max_iterations)));
        router
    }

    pub fn register(&mut self, factory: Arc<dyn AgentConfigFactory>) {
        self.factories.insert(factory.runner(), factory);
    }

    pub fn route(&self, runner: RunnerKind) -> Result<&dyn AgentConfigFactory> {
        self.factories
            .get(&runner)
            .map(|f| f.as_ref())
            .ok_or(StewardError::UnsupportedRunner {
                runner: format!("{runner:?}").to_lowercase(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use crate::session::SessionHandle;

    fn session() -> SessionHandle {
        SessionHandle::new(uuid::Uuid::new_v4(), std::env::temp_dir())
    }

    #[test]
    fn test_interactive_carries_shell() {
        let factory = InteractiveConfigFactory::new(Arc::new(ScriptedLlm::new(vec![])), 10);
        let config = factory.build("anything", &session());
        assert!(config.tools.has_tool("execute_command"));
        assert!(config.tools.has_tool("write_file"));
        assert_eq!(config.tools.names().len(), 5);
    }

    #[test]
    fn test_content_is_read_only() {
        let factory = ContentConfigFactory::new(Arc::new(ScriptedLlm::new(vec![])), 10);
        let config = factory.build("anything", &session());
        assert!(!config.tools.has_tool("execute_command"));
        assert!(!config.tools.has_tool("write_file"));
        assert!(config.tools.has_tool("read_file"));
        assert!(config.tools.has_tool("search_files"));
    }

    #[test]
    fn test_route_covers_stock_runners() {
        let router = TaskRouter::with_defaults(Arc::new(ScriptedLlm::new(vec![])), 10);
        assert_eq!(
            router.route(RunnerKind::Interactive).unwrap().runner(),
            RunnerKind::Interactive
        );
        assert_eq!(
            router.route(RunnerKind::Content).unwrap().runner(),
            RunnerKind::Content
        );
    }

    #[test]
    fn test_route_missing_runner_is_error() {
        let router = TaskRouter {
            factories: HashMap::new(),
        };
        assert!(matches!(
            router.route(RunnerKind::Content),
            Err(StewardError::UnsupportedRunner { .. })
        ));
    }
}
