//! Shared types crossing the engine/driver boundary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Overall status of one program run
///
/// `pending_request` on the state is non-null iff the status is one of the
/// `Awaiting*` variants; `Completed` and `Error` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    AwaitingAi,
    AwaitingUser,
    AwaitingToolEval,
    AwaitingHostEval,
    Completed,
    Error,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Error)
    }
}

/// The four AI-facing operations of the language
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiOpKind {
    /// Single request/response, result coerced to the destination type
    Do,
    /// Code generation spliced into the function table
    Vibe,
    /// Human-input solicitation
    Ask,
    /// Internal summarization round issued at compress-block exit
    Compress,
}

impl std::fmt::Display for AiOpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AiOpKind::Do => "do",
            AiOpKind::Vibe => "vibe",
            AiOpKind::Ask => "ask",
            AiOpKind::Compress => "compress",
        };
        f.write_str(s)
    }
}

/// One tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned id; results are paired back by this, never by position
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: JsonValue,
}

/// Result of executing one tool call
///
/// A failed execution (including "tool not found") carries an error string
/// instead of a value; it is fed back to the model, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub call_id: String,
    #[serde(default)]
    pub value: Option<JsonValue>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ToolCallResult {
    pub fn ok(call_id: impl Into<String>, value: JsonValue) -> Self {
        Self {
            call_id: call_id.into(),
            value: Some(value),
            error: None,
        }
    }

    pub fn err(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            value: None,
            error: Some(error.into()),
        }
    }
}

/// One completed round of a tool-calling conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRound {
    pub calls: Vec<ToolCall>,
    pub results: Vec<ToolCallResult>,
}

/// Why the provider stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Other,
}

/// Token accounting reported by the provider, when available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Provider-agnostic response to one AI request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    /// Raw text content of the response
    pub content: String,
    /// Structured value the adapter already parsed (e.g. via a JSON output
    /// mode); the engine still validates its shape against the target type
    #[serde(default)]
    pub parsed_value: Option<JsonValue>,
    /// Tool invocations the model requested, empty for a final answer
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub usage: Option<Usage>,
    pub stop_reason: StopReason,
}

impl AiResponse {
    /// A plain final-text response (the common case in tests and adapters)
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            parsed_value: None,
            tool_calls: Vec::new(),
            usage: None,
            stop_reason: StopReason::EndTurn,
        }
    }
}

/// A host-language export: enough payload for the driver to evaluate the
/// function in its own sandbox when the engine suspends on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostExport {
    pub params: Vec<String>,
    pub body: String,
}

/// One entry of the AI interaction audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiInteraction {
    pub id: uuid::Uuid,
    pub kind: AiOpKind,
    pub prompt: String,
    /// Model identifier as "provider/model", when one was pinned
    #[serde(default)]
    pub model: Option<String>,
    pub response: String,
    /// Provider round-trips this interaction took (tool rounds included)
    pub rounds: u32,
    pub at: DateTime<Utc>,
}
