//! Virtual machine state
//!
//! `Vm` holds the complete execution state of one program run: the call
//! stack, the instruction stack, the suspended-request slot, and the
//! function/module tables. Everything except the module table serializes;
//! modules are referenced by resolved path and rehydrated by the loader.
//!
//! The engine never performs I/O. When execution reaches an AI, user,
//! tool, or host boundary it records a pending request and returns; the
//! driver does the blocking work and calls one of the `resume_with_*`
//! functions below.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::coerce::{coerce_response, coerce_text};
use super::errors::{EngineError, ErrorInfo};
use super::types::{
    FrameEntry, FunctionDecl, Instruction, PendingAi, PendingRequest, Program, Stmt, Val,
};
use crate::module::{CodeParser, LoadedProgram, ModuleTable};
use crate::types::{AiInteraction, AiOpKind, AiResponse, RunStatus, ToolCallResult, ToolRound};

/// What happens when `vibe` output redeclares an existing function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedeclarePolicy {
    Overwrite,
    Reject,
}

/// Engine policies that travel with the state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnginePolicy {
    /// Round budget for tool-enabled conversations
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    #[serde(default = "default_redeclare")]
    pub vibe_redeclare: RedeclarePolicy,
}

fn default_max_tool_rounds() -> u32 {
    10
}
fn default_redeclare() -> RedeclarePolicy {
    RedeclarePolicy::Reject
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            vibe_redeclare: default_redeclare(),
        }
    }
}

/// Where a function-table entry came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum FunctionOrigin {
    /// Declared in the entry program
    Local,
    /// Imported from a module (the body is rehydrated from the module
    /// table after deserialization, never re-embedded in the document)
    Module { path: String },
    /// Spliced in by `vibe`
    Generated,
}

/// A callable name in the function table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Callable {
    Function {
        decl: FunctionDecl,
        origin: FunctionOrigin,
    },
    /// A host-language export, evaluated by the driver on call
    Host { path: String, name: String },
}

/// Top-level function table: program declarations, imports, vibe splices
pub type FunctionTable = HashMap<String, Callable>;

/// Complete, serializable state of one program run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vm {
    pub status: RunStatus,

    /// Call stack, outermost first; never empty
    pub frames: Vec<super::types::Frame>,

    /// Instruction stack (LIFO, top last); the unit of serializable truth
    pub instructions: Vec<Instruction>,

    /// The suspended operation; `Some` iff status is one of `Awaiting*`
    pub pending: Option<PendingRequest>,

    /// Result of the most recent expression statement / top-level return
    pub last_result: Val,

    /// Terminal fault, when status is `Error`
    pub error: Option<ErrorInfo>,

    pub functions: FunctionTable,

    /// Loaded modules, keyed by resolved path. Not serialized: the state
    /// document references modules by path and the loader rehydrates them.
    #[serde(skip)]
    pub modules: ModuleTable,

    /// Audit log of completed AI/user interactions
    pub interactions: Vec<AiInteraction>,

    pub policy: EnginePolicy,
}

impl Vm {
    /// Create a VM for a loader-resolved program
    pub fn new(loaded: LoadedProgram) -> Self {
        let mut vm = Self::bare(loaded.functions, loaded.modules, EnginePolicy::default());
        vm.push_stmts(&loaded.program.body);
        vm
    }

    /// Create a VM for a bare program with no imports (tests, embedding)
    pub fn from_program(program: Program) -> Self {
        let mut functions = FunctionTable::new();
        for stmt in &program.body {
            if let Stmt::FunctionDecl { decl } = stmt {
                functions.insert(
                    decl.name.clone(),
                    Callable::Function {
                        decl: decl.clone(),
                        origin: FunctionOrigin::Local,
                    },
                );
            }
        }
        let mut vm = Self::bare(functions, ModuleTable::default(), EnginePolicy::default());
        vm.push_stmts(&program.body);
        vm
    }

    pub fn with_policy(mut self, policy: EnginePolicy) -> Self {
        self.policy = policy;
        self
    }

    fn bare(functions: FunctionTable, modules: ModuleTable, policy: EnginePolicy) -> Self {
        Self {
            status: RunStatus::Running,
            frames: vec![super::types::Frame::new("main")],
            instructions: Vec::new(),
            pending: None,
            last_result: Val::Null,
            error: None,
            functions,
            modules,
            interactions: Vec::new(),
            policy,
        }
    }

    /* ===================== Stack helpers ===================== */

    /// Push statements so they execute first-to-last
    pub(crate) fn push_stmts(&mut self, body: &[Stmt]) {
        for stmt in body.iter().rev() {
            self.instructions.push(Instruction::Stmt { stmt: stmt.clone() });
        }
    }

    /// Deliver a completed sub-result to the instruction that owns it
    pub(crate) fn push_sub_result(&mut self, val: Val) {
        let delivered = match self.instructions.last_mut() {
            Some(instr) => instr.push_done(val),
            None => false,
        };
        if !delivered {
            self.fail(EngineError::Internal(
                "sub-result delivered to a non-expression instruction".to_string(),
            ));
        }
    }

    /// Record a terminal fault
    pub(crate) fn fail(&mut self, err: EngineError) {
        self.error = Some(err.info());
        self.pending = None;
        self.status = RunStatus::Error;
    }

    /* ===================== Resume API ===================== */

    /// Resume a state paused at `AwaitingAi` with a provider response
    ///
    /// A response carrying tool calls (within the round budget) moves the
    /// state to `AwaitingToolEval` instead of completing the operation; at
    /// the budget, the response is final regardless; a capped loop is a
    /// normal outcome. Vibe conversations resolve their final response via
    /// [`Vm::resume_with_generated_code`].
    pub fn resume_with_ai_response(&mut self, response: AiResponse) -> Result<(), EngineError> {
        let request = self.expect_ai(&[AiOpKind::Do, AiOpKind::Vibe, AiOpKind::Compress])?;

        if !response.tool_calls.is_empty() && request.current_round() < request.max_rounds {
            self.pending = Some(PendingRequest::ToolEval {
                request,
                calls: response.tool_calls,
            });
            self.status = RunStatus::AwaitingToolEval;
            return Ok(());
        }

        if request.kind == AiOpKind::Vibe {
            self.pending = Some(PendingRequest::Ai { request });
            return Err(EngineError::InvalidResumeState(
                "final vibe responses resume via resume_with_generated_code".to_string(),
            ));
        }

        let value = match coerce_response(
            response.parsed_value.as_ref(),
            &response.content,
            request.target,
        ) {
            Ok(v) => v,
            Err(e) => {
                self.fail(e.clone());
                return Err(e);
            }
        };

        self.log_interaction(&request, &response.content);
        if request.kind == AiOpKind::Do {
            self.current_frame_mut().entries.push(FrameEntry::AiEvent {
                kind: request.kind,
                prompt: request.prompt.clone(),
                response: response.content.clone(),
            });
        }

        self.finish_suspension(value)
    }

    /// Resume a state paused at `AwaitingUser` with the human's input
    pub fn resume_with_user_input(&mut self, input: &str) -> Result<(), EngineError> {
        if self.status != RunStatus::AwaitingUser {
            return Err(EngineError::InvalidResumeState(format!(
                "expected awaiting_user, was {:?}",
                self.status
            )));
        }
        let request = match self.pending.take() {
            Some(PendingRequest::Ai { request }) if request.kind == AiOpKind::Ask => request,
            other => {
                self.pending = other;
                return Err(EngineError::InvalidResumeState(
                    "pending request is not an ask".to_string(),
                ));
            }
        };

        let value = match coerce_text(input, request.target) {
            Ok(v) => v,
            Err(e) => {
                self.fail(e.clone());
                return Err(e);
            }
        };

        self.log_interaction(&request, input);
        self.current_frame_mut().entries.push(FrameEntry::AiEvent {
            kind: AiOpKind::Ask,
            prompt: request.prompt.clone(),
            response: input.to_string(),
        });

        self.finish_suspension(value)
    }

    /// Resume a state paused at `AwaitingToolEval` with the round's results
    ///
    /// Results are paired to calls by id on the provider side; the engine
    /// appends the round record and re-enters `AwaitingAi` so the driver
    /// sends the next request of the conversation.
    pub fn resume_with_tool_results(
        &mut self,
        results: Vec<ToolCallResult>,
    ) -> Result<(), EngineError> {
        if self.status != RunStatus::AwaitingToolEval {
            return Err(EngineError::InvalidResumeState(format!(
                "expected awaiting_tool_eval, was {:?}",
                self.status
            )));
        }
        let (mut request, calls) = match self.pending.take() {
            Some(PendingRequest::ToolEval { request, calls }) => (request, calls),
            other => {
                self.pending = other;
                return Err(EngineError::InvalidResumeState(
                    "pending request is not a tool evaluation".to_string(),
                ));
            }
        };

        request.history.push(ToolRound { calls, results });
        self.pending = Some(PendingRequest::Ai { request });
        self.status = RunStatus::AwaitingAi;
        Ok(())
    }

    /// Resume a vibe conversation with the model's final generated code
    ///
    /// The text is parsed as a function declaration and spliced into the
    /// function table, then invoked with the captured argument values. A
    /// parse failure is `GeneratedCodeSyntax`: fatal here, never retried
    /// by the generic retry wrapper; regeneration is a driver policy.
    pub fn resume_with_generated_code(
        &mut self,
        code: &str,
        parser: &dyn CodeParser,
    ) -> Result<(), EngineError> {
        let request = self.expect_ai(&[AiOpKind::Vibe])?;

        let decl = match parser.parse_function(code) {
            Ok(decl) => decl,
            Err(msg) => {
                let err = EngineError::GeneratedCodeSyntax(msg);
                self.fail(err.clone());
                return Err(err);
            }
        };

        if self.functions.contains_key(&decl.name)
            && self.policy.vibe_redeclare == RedeclarePolicy::Reject
        {
            let err = EngineError::GeneratedRedeclaration(decl.name.clone());
            self.fail(err.clone());
            return Err(err);
        }

        self.log_interaction(&request, code);
        self.current_frame_mut().entries.push(FrameEntry::AiEvent {
            kind: AiOpKind::Vibe,
            prompt: request.prompt.clone(),
            response: code.to_string(),
        });

        let name = decl.name.clone();
        self.functions.insert(
            name.clone(),
            Callable::Function {
                decl,
                origin: FunctionOrigin::Generated,
            },
        );

        // Replace the suspension with the immediate invocation
        match self.instructions.pop() {
            Some(Instruction::CallAi { .. }) => {}
            other => {
                self.fail(EngineError::Internal(format!(
                    "resumed vibe but top instruction was {:?}",
                    other
                )));
                return Ok(());
            }
        }
        self.instructions.push(Instruction::CallFunction {
            name,
            args: request.args,
            frame_pushed: false,
        });
        self.pending = None;
        self.status = RunStatus::Running;
        Ok(())
    }

    /// Resume a state paused at `AwaitingHostEval` with the host's value
    pub fn resume_with_host_result(&mut self, value: Val) -> Result<(), EngineError> {
        if self.status != RunStatus::AwaitingHostEval {
            return Err(EngineError::InvalidResumeState(format!(
                "expected awaiting_host_eval, was {:?}",
                self.status
            )));
        }
        match self.pending.take() {
            Some(PendingRequest::HostEval { .. }) => {}
            other => {
                self.pending = other;
                return Err(EngineError::InvalidResumeState(
                    "pending request is not a host evaluation".to_string(),
                ));
            }
        }
        match self.instructions.pop() {
            Some(Instruction::EvalHostCode { .. }) => {}
            other => {
                self.fail(EngineError::Internal(format!(
                    "resumed host eval but top instruction was {:?}",
                    other
                )));
                return Ok(());
            }
        }
        self.push_sub_result(value);
        self.status = RunStatus::Running;
        Ok(())
    }

    /// The audit log of completed AI/user interactions
    pub fn interactions(&self) -> &[AiInteraction] {
        &self.interactions
    }

    /* ===================== Internals ===================== */

    /// Take the pending AI request, validating status and operation kind
    fn expect_ai(&mut self, kinds: &[AiOpKind]) -> Result<PendingAi, EngineError> {
        if self.status != RunStatus::AwaitingAi {
            return Err(EngineError::InvalidResumeState(format!(
                "expected awaiting_ai, was {:?}",
                self.status
            )));
        }
        match self.pending.take() {
            Some(PendingRequest::Ai { request }) if kinds.contains(&request.kind) => Ok(request),
            other => {
                self.pending = other;
                Err(EngineError::InvalidResumeState(
                    "pending request does not match the resume kind".to_string(),
                ))
            }
        }
    }

    /// Pop the suspension instruction and hand its value to the owner
    fn finish_suspension(&mut self, value: Val) -> Result<(), EngineError> {
        match self.instructions.pop() {
            Some(Instruction::CallAi { .. }) | Some(Instruction::AwaitUser { .. }) => {}
            other => {
                self.fail(EngineError::Internal(format!(
                    "resumed but top instruction was {:?}",
                    other
                )));
                return Ok(());
            }
        }
        self.push_sub_result(value);
        self.pending = None;
        self.status = RunStatus::Running;
        Ok(())
    }

    fn log_interaction(&mut self, request: &PendingAi, response: &str) {
        self.interactions.push(AiInteraction {
            id: uuid::Uuid::new_v4(),
            kind: request.kind,
            prompt: request.prompt.clone(),
            model: request
                .model
                .as_ref()
                .map(|cfg| format!("{}/{}", cfg.provider, cfg.model)),
            response: response.to_string(),
            rounds: request.current_round(),
            at: chrono::Utc::now(),
        });
    }
}
