//! Deterministic client for tests
//!
//! Plays back a scripted sequence of replies, optionally repeating the last
//! configured reply forever (for iteration-limit scenarios).

use crate::error::{Result, StewardError};
use crate::llm::{LlmClient, LlmReply};
use crate::task::Message;
use crate::tool::ToolDescriptor;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

pub struct ScriptedLlm {
    script: Mutex<VecDeque<LlmReply>>,
    repeat: Option<LlmReply>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<LlmReply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            repeat: None,
        }
    }

    /// After the script runs out, keep returning this reply.
    pub fn with_repeat(mut self, reply: LlmReply) -> Self {
        self.repeat = Some(reply);
        self
    }

    /// Shorthand for a requested tool invocation.
    pub fn tool_call(name: &str, arguments: serde_json::Value) -> LlmReply {
        LlmReply::ToolCall {
            name: name.to_string(),
            arguments,
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(
        &self,
        _system_prompt: &str,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> Result<LlmReply> {
        if let Some(reply) = self.script.lock().pop_front() {
            return Ok(reply);
        }
        if let Some(reply) = &self.repeat {
            return Ok(reply.clone());
        }
        // Scripts must cover the scenario; running past the end is a test
        // bug, so the error is non-retryable to fail fast.
        Err(StewardError::Provider {
            status: 400,
            message: "scripted client exhausted".to_string(),
        })
    }
}
