//! Provider-agnostic request assembly
//!
//! Builds the request document for a suspended AI operation: the prompt,
//! the context projection of live frames, the target type the engine
//! derived from the destination variable, and the tool specs the
//! conversation may use. What structured output is *required* is decided
//! here; *how* a provider enforces it is the adapter's concern.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::tools::ToolRegistry;
use crate::context;
use crate::executor::types::ast::ContextScope;
use crate::executor::types::{ModelConfig, PendingRequest, TypeAnnotation};
use crate::executor::{EngineError, Vm};
use crate::types::{AiOpKind, ToolRound};

/// Declaration of one tool offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the arguments object
    #[serde(default)]
    pub parameters: JsonValue,
}

/// One provider-agnostic AI request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRequest {
    pub operation: AiOpKind,
    pub prompt: String,
    /// Deterministic projection of live program state (§context)
    pub context_text: String,
    #[serde(default)]
    pub target: Option<TypeAnnotation>,
    #[serde(default)]
    pub model: Option<ModelConfig>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    /// Completed tool rounds of this conversation, oldest first
    #[serde(default)]
    pub history: Vec<ToolRound>,
}

/// Build the request for a state paused at `AwaitingAi`
///
/// The tool registry contributes full specs for the tool names the
/// operation declared; names without a registered tool are passed through
/// as bare specs; executing them later folds a "tool not found" error
/// into the conversation rather than failing here.
pub fn build_request(vm: &Vm, registry: Option<&ToolRegistry>) -> Result<AiRequest, EngineError> {
    let request = match &vm.pending {
        Some(PendingRequest::Ai { request }) => request,
        _ => {
            return Err(EngineError::InvalidResumeState(
                "no pending AI request to build".to_string(),
            ))
        }
    };

    let context_text = match request.scope {
        ContextScope::Local => context::build_local_context(vm),
        ContextScope::Global => context::build_global_context(vm),
    };

    let tools = request
        .tools
        .iter()
        .map(|name| match registry.and_then(|r| r.spec(name)) {
            Some(spec) => spec,
            None => ToolSpec {
                name: name.clone(),
                description: String::new(),
                parameters: JsonValue::Null,
            },
        })
        .collect();

    Ok(AiRequest {
        operation: request.kind,
        prompt: request.prompt.clone(),
        context_text,
        target: request.target,
        model: request.model.clone(),
        tools,
        history: request.history.clone(),
    })
}
