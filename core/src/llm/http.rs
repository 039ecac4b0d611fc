//! OpenAI-compatible chat completions client

use crate::error::{Result, StewardError};
use crate::llm::{LlmClient, LlmReply};
use crate::task::{Message, MessageRole};
use crate::tool::ToolDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmEndpoint {
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// HTTP client against `{base_url}/chat/completions`.
pub struct HttpLlmClient {
    endpoint: LlmEndpoint,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    type_: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    function: WireCalledFunction,
}

#[derive(Deserialize)]
struct WireCalledFunction {
    name: String,
    arguments: String,
}

impl HttpLlmClient {
    pub fn new(endpoint: LlmEndpoint) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StewardError::Provider {
                status: 0,
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { endpoint, client })
    }

    fn wire_role(role: MessageRole) -> &'static str {
        match role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            // Tool observations go back as user turns; we do not track
            // provider-side tool_call ids across the opaque boundary.
            MessageRole::Tool => "user",
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<LlmReply> {
        let mut messages = vec![WireMessage {
            role: "system",
            content: system_prompt,
        }];
        for msg in history {
            messages.push(WireMessage {
                role: Self::wire_role(msg.role),
                content: &msg.content,
            });
        }

        let wire_tools: Vec<WireTool> = tools
            .iter()
            .map(|t| WireTool {
                type_: "function",
                function: WireFunction {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters,
                },
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.endpoint.model,
            "messages": messages,
        });
        if !wire_tools.is_empty() {
            body["tools"] = serde_json::to_value(&wire_tools)?;
        }

        let url = format!("{}/chat/completions", self.endpoint.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| StewardError::Provider {
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StewardError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| StewardError::Provider {
            status: 0,
            message: format!("malformed completion response: {e}"),
        })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| StewardError::Provider {
            status: 0,
            message: "completion response contained no choices".to_string(),
        })?;

        if let Some(call) = choice.message.tool_calls.and_then(|mut c| {
            if c.is_empty() {
                None
            } else {
                Some(c.remove(0))
            }
        }) {
            // Arguments arrive as a JSON-encoded string
            let arguments = serde_json::from_str(&call.function.arguments)
                .unwrap_or(serde_json::Value::String(call.function.arguments));
            return Ok(LlmReply::ToolCall {
                name: call.function.name,
                arguments,
            });
        }

        Ok(LlmReply::Text(choice.message.content.unwrap_or_default()))
    }
}
