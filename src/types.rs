//! Shared types used across the hwmetrics runtime.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chat transcript
// ---------------------------------------------------------------------------

/// Role of a turn in the conversation transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn in the conversation transcript, in the wire shape the
/// chat-completions endpoint expects.
///
/// The transcript is owned by a single in-flight request and is never
/// persisted or shared across requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallPayload>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// Assistant turn carrying the tool calls the model issued, echoed back
    /// verbatim so the endpoint can correlate the tool results that follow.
    pub fn assistant_with_calls(content: Option<String>, calls: Vec<ToolCallPayload>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content,
            tool_calls: Some(calls),
            tool_call_id: None,
            name: None,
        }
    }

    /// Tool-result turn associated with a prior tool call.
    pub fn tool_result(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            name: Some(tool.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tool calls
// ---------------------------------------------------------------------------

/// Wire shape of a tool call as the endpoint emits and consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub id: String,
    pub r#type: String,
    pub function: FunctionCallPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallPayload {
    pub name: String,
    /// Raw JSON-encoded arguments. Untrusted: the orchestrator parses this
    /// and degrades to an empty object on failure.
    pub arguments: String,
}

/// A tool call request from the model, as the executor sees it.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl From<&ToolCallPayload> for ToolCall {
    fn from(p: &ToolCallPayload) -> Self {
        Self {
            id: p.id.clone(),
            name: p.function.name.clone(),
            arguments: p.function.arguments.clone(),
        }
    }
}

/// Model reply for one iteration: plain text, tool calls, or both.
#[derive(Debug, Clone, Default)]
pub struct AssistantReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallPayload>,
}

// ---------------------------------------------------------------------------
// Collector samples
// ---------------------------------------------------------------------------

/// Host inventory collected once per tick and upserted by hostname.
#[derive(Debug, Clone, Default)]
pub struct HostInfo {
    pub hostname: String,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub cpu_model: Option<String>,
    pub cpu_cores: Option<i64>,
    pub cpu_threads: Option<i64>,
    pub ram_total_mb: Option<i64>,
    pub gpu_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CpuSample {
    pub usage_percent: f64,
    pub temperature_c: Option<f64>,
    pub freq_mhz: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RamSample {
    pub used_mb: i64,
    pub available_mb: i64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone)]
pub struct GpuSample {
    pub utilization_percent: f64,
    pub temperature_c: f64,
    pub memory_used_mb: i64,
    pub name: Option<String>,
}
