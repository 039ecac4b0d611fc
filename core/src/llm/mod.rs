//! Language-model client interface
//!
//! The backend is an opaque capability: given the conversation so far and the
//! available tool descriptors, it returns either a final text reply or a
//! requested tool invocation. The concrete wire format lives behind the
//! trait.

use crate::error::Result;
use crate::task::Message;
use crate::tool::ToolDescriptor;
use async_trait::async_trait;

pub mod http;
pub mod mock;

pub use http::HttpLlmClient;
pub use mock::ScriptedLlm;

/// What the model asked for in one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmReply {
    /// Final answer for this task
    Text(String),
    /// Requested tool invocation
    ToolCall {
        name: String,
        arguments: serde_json::Value,
    },
}

/// LLM client interface
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the system prompt, running history, and tool descriptors;
    /// get the model's next move.
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<LlmReply>;
}
