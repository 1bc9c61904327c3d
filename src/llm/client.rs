//! Chat-completions client for an OpenAI-compatible endpoint.
//!
//! The endpoint's output is treated as an untrusted data source: missing
//! choices, absent content, and malformed tool-call arguments are all legal
//! inputs for the orchestrator to absorb.

use crate::config::Config;
use crate::error::AskError;
use crate::tools::ToolDescriptor;
use crate::types::{AssistantReply, ChatMessage, ToolCallPayload};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Tool-use policy for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    /// The model may choose zero or more tools.
    Auto,
    /// Tool use disabled (finalization restatement).
    None,
}

impl ToolChoice {
    fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDescriptor]>,
    tool_choice: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallPayload>,
}

/// Minimal request/response client for the chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    base_url: String,
    api_key: Option<String>,
    pub model: String,
    http: reqwest::Client,
}

impl ChatClient {
    /// Build a client from config; the request timeout is the only timeout
    /// the orchestration loop relies on.
    pub fn new(config: &Config) -> Result<Self, AskError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_seconds))
            .build()?;

        Ok(Self {
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
            http,
        })
    }

    /// Send the transcript and tool descriptors; returns the first choice's
    /// message as content and/or tool calls.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDescriptor]>,
        tool_choice: ToolChoice,
    ) -> Result<AssistantReply, AskError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages,
            tools,
            tool_choice: tool_choice.as_str(),
        };

        debug!(model = %self.model, messages = messages.len(), "chat request");

        let mut builder = self.http.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AskError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatResponse = resp.json().await?;

        let message = match body.choices.into_iter().next() {
            Some(choice) => choice.message,
            None => {
                return Ok(AssistantReply::default());
            }
        };

        Ok(AssistantReply {
            content: message.content,
            tool_calls: message.tool_calls,
        })
    }
}
