//! Abstract Syntax Tree node types
//!
//! The engine consumes a validated AST produced by the front-end parser.
//! Nodes are serde-tagged so programs round-trip through the same JSON wire
//! format the parser emits (and that tests construct directly).

use serde::{Deserialize, Serialize};

use super::frame::ContextMode;
use super::values::{ModelConfig, TypeAnnotation};

/// Variable declaration kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Let,
    Const,
}

/// Which context projection an AI operation sends with its prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextScope {
    /// Only the innermost frame
    Local,
    /// All frames, outermost first
    Global,
}

impl Default for ContextScope {
    fn default() -> Self {
        ContextScope::Global
    }
}

/// A whole program: the statement list of one module/entry file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Stmt>,
}

/// A top-level function declaration
///
/// Function declarations are hoisted into the function table before
/// execution; `vibe` splices generated declarations into the same table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

/// Statement AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Stmt {
    Block {
        body: Vec<Stmt>,
        #[serde(default)]
        mode: ContextMode,
    },
    Declare {
        var_kind: VarKind,
        name: String,
        #[serde(default)]
        annotation: Option<TypeAnnotation>,
        init: Option<Expr>,
    },
    Assign {
        var: String,
        value: Expr,
    },
    If {
        test: Expr,
        then_s: Box<Stmt>,
        else_s: Option<Box<Stmt>>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    ForIn {
        binding: String,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Return {
        value: Option<Expr>,
    },
    Expr {
        expr: Expr,
    },
    Break,
    Continue,
    FunctionDecl {
        decl: FunctionDecl,
    },
    ModelDecl {
        name: String,
        config: ModelConfig,
    },
    Import {
        names: Vec<ImportBinding>,
        from: String,
        #[serde(default)]
        kind: ImportKind,
    },
}

/// One imported name, optionally renamed at the import site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBinding {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
}

impl ImportBinding {
    /// The name the import binds locally
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Import source kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportKind {
    /// Another `.aria` module, executed by this engine
    Aria,
    /// A host-language module, evaluated by the driver on demand
    Host,
}

impl Default for ImportKind {
    fn default() -> Self {
        ImportKind::Aria
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    And, // short-circuit
    Or,  // short-circuit
}

/// Expression AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    LitBool {
        v: bool,
    },
    LitNum {
        v: f64,
    },
    LitText {
        v: String,
    },
    LitNull,
    LitList {
        elements: Vec<Expr>,
    },
    LitObj {
        properties: Vec<(String, Expr)>,
    },
    Ident {
        name: String,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    /// Single AI request; the result is coerced to the destination's type
    Do {
        prompt: Box<Expr>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        tools: Vec<String>,
        #[serde(default)]
        scope: ContextScope,
    },
    /// Human-input solicitation; syntactically parallel to `do`
    Ask {
        prompt: Box<Expr>,
    },
    /// Code generation: the model writes a function declaration which is
    /// spliced into the function table and immediately invoked
    Vibe {
        prompt: Box<Expr>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        tools: Vec<String>,
        #[serde(default)]
        args: Vec<Expr>,
    },
}
