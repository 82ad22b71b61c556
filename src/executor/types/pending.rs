//! Suspended-operation payloads
//!
//! When execution reaches an AI/user/tool/host boundary the engine stores
//! one of these on the state and returns control. The payload is everything
//! the driver needs to perform the I/O, and everything the engine needs to
//! pick up where it left off. It serializes with the rest of the state.

use serde::{Deserialize, Serialize};

use super::ast::ContextScope;
use super::values::{ModelConfig, TypeAnnotation, Val};
use crate::types::{AiOpKind, ToolCall, ToolRound};

/// A suspended AI operation (`do`, `vibe`, `ask`, or `compress`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAi {
    pub kind: AiOpKind,
    /// Fully interpolated prompt text
    pub prompt: String,
    /// Resolved model reference; `None` lets the driver pick its default
    #[serde(default)]
    pub model: Option<ModelConfig>,
    /// Declared type of the destination variable; drives coercion and the
    /// structured-output decision (how a provider enforces it is the
    /// adapter's concern)
    #[serde(default)]
    pub target: Option<TypeAnnotation>,
    /// Names of tools the operation may use
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub scope: ContextScope,
    /// Argument values captured from the calling scope (`vibe` only; the
    /// generated function is invoked with these immediately after splicing)
    #[serde(default)]
    pub args: Vec<Val>,
    /// Completed tool rounds of this conversation, oldest first
    #[serde(default)]
    pub history: Vec<ToolRound>,
    /// Round budget; reaching it makes the last response final, not an error
    pub max_rounds: u32,
}

impl PendingAi {
    /// Provider round-trips performed so far plus the in-flight one
    pub fn current_round(&self) -> u32 {
        self.history.len() as u32 + 1
    }
}

/// What a paused state is waiting on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum PendingRequest {
    /// Waiting on a provider response (or user input for `ask`)
    Ai { request: PendingAi },
    /// Waiting on the driver to execute a batch of tool calls
    ToolEval {
        request: PendingAi,
        calls: Vec<ToolCall>,
    },
    /// Waiting on the driver to evaluate host-language code
    HostEval {
        params: Vec<String>,
        body: String,
        args: Vec<Val>,
    },
}
