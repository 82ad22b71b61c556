//! Call-stack frames and their ordered entries
//!
//! A frame is one call-stack level: the bindings of a function (or the
//! top-level program) plus the execution-ordered entry list the context
//! assembler renders from. Nested lexical blocks are flattened into their
//! owning frame; block boundaries are tracked as marks so block exit can
//! remove exactly the bindings the block introduced.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::values::{TypeAnnotation, Val, Variable};
use crate::types::AiOpKind;

/// Context retention mode for a block
///
/// Set per-loop by the program author; `Verbose` is the default everywhere
/// else. `Compress` trades a token round-trip for bounded context growth,
/// a deliberate, author-visible tradeoff, never applied silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// Entries accumulate and stay visible after block exit
    Verbose,
    /// Entries are discarded entirely at block exit
    Forget,
    /// Entries are replaced by one AI-written summary entry at block exit
    Compress,
}

impl Default for ContextMode {
    fn default() -> Self {
        ContextMode::Verbose
    }
}

/// One entry in a frame's execution-ordered entry list
///
/// The substrate the context assembler renders from. Declarations and
/// AI-prompt events append here in execution order, preserving causal
/// ordering for the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum FrameEntry {
    /// A variable declaration. `value` is `None` while the binding is live
    /// (the renderer reads the current local); block exit freezes the final
    /// value in so the entry stays renderable after the binding is gone.
    Variable {
        name: String,
        #[serde(default)]
        annotation: Option<TypeAnnotation>,
        #[serde(default)]
        value: Option<Val>,
    },
    /// A completed AI or user interaction
    AiEvent {
        kind: AiOpKind,
        prompt: String,
        response: String,
    },
    /// The synthetic summary a compress-mode block leaves behind
    Summary { text: String },
}

/// An open block scope inside a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMark {
    /// Entry-list length at block entry
    pub entry_mark: usize,
    /// Names declared since block entry, in order
    pub declared: Vec<String>,
    pub mode: ContextMode,
}

/// One call-stack level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Owning function name ("main" for the top-level program)
    pub name: String,
    /// Live bindings, unique names within the frame
    pub locals: HashMap<String, Variable>,
    /// Append-only, execution-ordered declarations and AI events
    pub entries: Vec<FrameEntry>,
    /// Open block scopes, innermost last
    pub blocks: Vec<BlockMark>,
}

impl Frame {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locals: HashMap::new(),
            entries: Vec::new(),
            blocks: Vec::new(),
        }
    }
}
