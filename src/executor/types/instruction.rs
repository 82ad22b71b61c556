//! Instruction stack node types
//!
//! The instruction stack replaces the host call stack: every unit of
//! in-flight work, including a statement half-way through an expression
//! with a live AI request, is one of these serializable values. Statements
//! decompose lazily: a `Stmt` instruction expands into the specific
//! instruction(s) for its node when popped, depth-first.
//!
//! Instructions that evaluate expressions carry a `done` queue of completed
//! sub-results (AI responses, returned call values, host results) consumed
//! in deterministic left-to-right site order on re-execution. That queue is
//! the payload that makes mid-expression resumption possible.

use serde::{Deserialize, Serialize};

use super::ast::{Expr, Stmt, VarKind};
use super::frame::ContextMode;
use super::pending::PendingAi;
use super::values::{TypeAnnotation, Val};

/// What an unwind is looking for as it pops the instruction stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum UnwindKind {
    /// Pop to the nearest enclosing loop and remove it
    Break,
    /// Pop to the nearest enclosing loop and resume it
    Continue,
    /// Pop to the nearest function boundary and deliver the value to the
    /// caller's continuation (or finish the program at top level)
    Return(Val),
}

/// One atomic unit of interpreter work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Instruction {
    /// An undecomposed statement
    Stmt { stmt: Stmt },

    Declare {
        var_kind: VarKind,
        name: String,
        #[serde(default)]
        annotation: Option<TypeAnnotation>,
        init: Option<Expr>,
        #[serde(default)]
        done: Vec<Val>,
    },

    Assign {
        var: String,
        value: Expr,
        #[serde(default)]
        done: Vec<Val>,
    },

    ExprStmt {
        expr: Expr,
        #[serde(default)]
        done: Vec<Val>,
    },

    Return {
        value: Option<Expr>,
        #[serde(default)]
        done: Vec<Val>,
    },

    If {
        test: Expr,
        then_s: Box<Stmt>,
        else_s: Option<Box<Stmt>>,
        #[serde(default)]
        done: Vec<Val>,
    },

    /// Stays on the stack across iterations; doubles as the unwind
    /// boundary marker for `break`/`continue`
    While {
        test: Expr,
        body: Box<Stmt>,
        /// Entry-list position at loop start, for compress-mode bodies:
        /// every iteration's region starts here, so each summarization
        /// folds the previous summary in and exactly one entry remains
        #[serde(default)]
        mark: Option<usize>,
        #[serde(default)]
        done: Vec<Val>,
    },

    /// Stays on the stack across iterations, like `While`
    ForIn {
        binding: String,
        iterable: Expr,
        body: Box<Stmt>,
        /// `None` until the iterable has been evaluated
        items: Option<Vec<Val>>,
        idx: usize,
        /// Loop-start entry mark for compress-mode bodies (see `While`)
        #[serde(default)]
        mark: Option<usize>,
        #[serde(default)]
        done: Vec<Val>,
    },

    /// Open a block scope in the current frame
    EnterBlock {
        mode: ContextMode,
        /// Explicit region start (loop iterations of a compress body)
        #[serde(default)]
        mark: Option<usize>,
    },

    /// Close the innermost block scope: freeze/discard/compress its
    /// entries per mode, drop its bindings. A compress exit suspends for
    /// one summarization round; the summary arrives through `done`.
    ExitBlock {
        mode: ContextMode,
        #[serde(default)]
        done: Vec<Val>,
    },

    /// Invoke a function-table entry; doubles as the function boundary
    /// marker `return` unwinds to
    CallFunction {
        name: String,
        args: Vec<Val>,
        /// Whether the callee frame has been pushed yet
        frame_pushed: bool,
    },

    /// Suspend for a provider response (`do`/`vibe`/`compress`)
    CallAi { request: PendingAi },

    /// Suspend for human input (`ask`)
    AwaitUser {
        prompt: String,
        #[serde(default)]
        target: Option<TypeAnnotation>,
    },

    /// Suspend for the driver to evaluate host-language code
    EvalHostCode {
        params: Vec<String>,
        body: String,
        args: Vec<Val>,
    },

    /// Pop the stack to the matching boundary, running block cleanups on
    /// the way; control flow is data, never a host exception
    Unwind { kind: UnwindKind },
}

impl Instruction {
    /// Append a completed sub-result to this instruction's `done` queue
    ///
    /// Only meaningful for expression-bearing instructions; others return
    /// `false` so the caller can flag the internal error.
    pub fn push_done(&mut self, val: Val) -> bool {
        match self {
            Instruction::Declare { done, .. }
            | Instruction::Assign { done, .. }
            | Instruction::ExprStmt { done, .. }
            | Instruction::Return { done, .. }
            | Instruction::If { done, .. }
            | Instruction::While { done, .. }
            | Instruction::ForIn { done, .. }
            | Instruction::ExitBlock { done, .. } => {
                done.push(val);
                true
            }
            _ => false,
        }
    }
}
