//! Engine fault types
//!
//! Engine faults are fatal: they abort the run and surface to the driver
//! unchanged. The terminal state stores a serializable `ErrorInfo` so a
//! failed run's document still explains itself after a restart.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::values::TypeAnnotation;

/// Error information with code and message, stored on a failed state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g. "CONST_REASSIGNMENT")
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Faults raised by the engine itself
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("duplicate declaration of '{0}' in the current frame")]
    DuplicateDeclaration(String),

    #[error("cannot reassign const '{0}'")]
    ConstReassignment(String),

    #[error("invalid resume: {0}")]
    InvalidResumeState(String),

    #[error("cannot coerce response {value:?} to declared type {target}")]
    TypeCoercion { value: String, target: TypeAnnotation },

    #[error("generated code failed to parse: {0}")]
    GeneratedCodeSyntax(String),

    #[error("generated function '{0}' redeclares an existing function")]
    GeneratedRedeclaration(String),

    #[error("'{0}' is not callable")]
    NotCallable(String),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable code for the stored `ErrorInfo`
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::UndefinedVariable(_) => UNDEFINED_VARIABLE,
            EngineError::DuplicateDeclaration(_) => DUPLICATE_DECLARATION,
            EngineError::ConstReassignment(_) => CONST_REASSIGNMENT,
            EngineError::InvalidResumeState(_) => INVALID_RESUME_STATE,
            EngineError::TypeCoercion { .. } => TYPE_COERCION,
            EngineError::GeneratedCodeSyntax(_) => GENERATED_CODE_SYNTAX,
            EngineError::GeneratedRedeclaration(_) => GENERATED_REDECLARATION,
            EngineError::NotCallable(_) => NOT_CALLABLE,
            EngineError::TypeError(_) => TYPE_ERROR,
            EngineError::Internal(_) => INTERNAL_ERROR,
        }
    }

    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::new(self.code(), self.to_string())
    }
}

/// Error code: Undefined variable
pub const UNDEFINED_VARIABLE: &str = "UNDEFINED_VARIABLE";

/// Error code: Name already declared in the current frame
pub const DUPLICATE_DECLARATION: &str = "DUPLICATE_DECLARATION";

/// Error code: Assignment to a const binding
pub const CONST_REASSIGNMENT: &str = "CONST_REASSIGNMENT";

/// Error code: Resume called in the wrong status or for the wrong kind
pub const INVALID_RESUME_STATE: &str = "INVALID_RESUME_STATE";

/// Error code: AI response did not match the declared target type
pub const TYPE_COERCION: &str = "TYPE_COERCION";

/// Error code: vibe output was not a parseable function declaration
pub const GENERATED_CODE_SYNTAX: &str = "GENERATED_CODE_SYNTAX";

/// Error code: vibe output collided with an existing function under the
/// reject policy
pub const GENERATED_REDECLARATION: &str = "GENERATED_REDECLARATION";

/// Error code: Value is not callable
pub const NOT_CALLABLE: &str = "NOT_CALLABLE";

/// Error code: Wrong type for an operation
pub const TYPE_ERROR: &str = "TYPE_ERROR";

/// Error code: Internal error (validator bug, should not happen)
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
