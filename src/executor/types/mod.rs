//! Type definitions for the executor
//!
//! This module contains all the core types used by the executor:
//! - AST nodes (Program, Stmt, Expr)
//! - Runtime values (Val, Variable, TypeAnnotation)
//! - Call-stack frames and ordered entries (Frame, FrameEntry)
//! - Instruction stack nodes (Instruction, UnwindKind)
//! - Suspended-operation payloads (PendingRequest, PendingAi)

pub mod ast;
pub mod frame;
pub mod instruction;
pub mod pending;
pub mod values;

// Re-export all types for convenient access
pub use ast::{
    BinaryOp, ContextScope, Expr, FunctionDecl, ImportBinding, ImportKind, Program, Stmt, UnaryOp,
    VarKind,
};
pub use frame::{BlockMark, ContextMode, Frame, FrameEntry};
pub use instruction::{Instruction, UnwindKind};
pub use pending::{PendingAi, PendingRequest};
pub use values::{json_to_val, val_to_json, ModelConfig, TypeAnnotation, Val, Variable};
