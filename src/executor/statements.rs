//! Instruction execution handlers
//!
//! Each instruction kind has a handler that advances it by one atomic
//! step. Handlers manipulate the instruction stack directly: an
//! instruction that needs more steps stays on the stack (loops, open
//! suspensions), one that finished pops itself.

use super::errors::EngineError;
use super::expressions::{eval_root, EvalResult, Need};
use super::types::ast::ContextScope;
use super::types::{
    ContextMode, Expr, Frame, FrameEntry, Instruction, PendingAi, PendingRequest, Stmt,
    TypeAnnotation, UnwindKind, Val, VarKind, Variable,
};
use super::vm::{Callable, Vm};
use crate::context;
use crate::types::{AiOpKind, RunStatus};

/* ===================== Statement decomposition ===================== */

/// Decompose one statement into its specific instruction(s)
pub fn execute_stmt(vm: &mut Vm, stmt: Stmt) {
    vm.instructions.pop();

    match stmt {
        Stmt::Block { body, mode } => {
            // Popped in order: EnterBlock, body..., ExitBlock
            vm.instructions.push(Instruction::ExitBlock {
                mode,
                done: Vec::new(),
            });
            vm.push_stmts(&body);
            vm.instructions.push(Instruction::EnterBlock { mode, mark: None });
        }

        Stmt::Declare {
            var_kind,
            name,
            annotation,
            init,
        } => vm.instructions.push(Instruction::Declare {
            var_kind,
            name,
            annotation,
            init,
            done: Vec::new(),
        }),

        Stmt::Assign { var, value } => vm.instructions.push(Instruction::Assign {
            var,
            value,
            done: Vec::new(),
        }),

        Stmt::Expr { expr } => vm.instructions.push(Instruction::ExprStmt {
            expr,
            done: Vec::new(),
        }),

        Stmt::If {
            test,
            then_s,
            else_s,
        } => vm.instructions.push(Instruction::If {
            test,
            then_s,
            else_s,
            done: Vec::new(),
        }),

        Stmt::While { test, body } => vm.instructions.push(Instruction::While {
            test,
            body,
            mark: None,
            done: Vec::new(),
        }),

        Stmt::ForIn {
            binding,
            iterable,
            body,
        } => vm.instructions.push(Instruction::ForIn {
            binding,
            iterable,
            body,
            items: None,
            idx: 0,
            mark: None,
            done: Vec::new(),
        }),

        Stmt::Return { value } => vm.instructions.push(Instruction::Return {
            value,
            done: Vec::new(),
        }),

        Stmt::Break => vm.instructions.push(Instruction::Unwind {
            kind: UnwindKind::Break,
        }),

        Stmt::Continue => vm.instructions.push(Instruction::Unwind {
            kind: UnwindKind::Continue,
        }),

        // Hoisted into the function table before execution
        Stmt::FunctionDecl { .. } => {}

        // Resolved by the module loader before execution
        Stmt::Import { .. } => {}

        Stmt::ModelDecl { name, config } => {
            let var = Variable::new(Val::Model(config))
                .with_annotation(Some(TypeAnnotation::Model))
                .constant();
            if let Err(e) = vm.declare(&name, var) {
                vm.fail(e);
            }
        }
    }
}

/* ===================== Expression-bearing handlers ===================== */

/// Handle a non-value evaluation outcome; returns the value when there is one
macro_rules! eval_or_suspend {
    ($vm:expr, $result:expr) => {
        match $result {
            EvalResult::Value(v) => v,
            EvalResult::Needs(need) => {
                push_need($vm, need);
                return;
            }
            EvalResult::Throw(e) => {
                $vm.fail(e);
                return;
            }
        }
    };
}

/// Execute a Declare instruction
pub fn execute_declare(
    vm: &mut Vm,
    var_kind: VarKind,
    name: String,
    annotation: Option<TypeAnnotation>,
    init: Option<Expr>,
    done: Vec<Val>,
) {
    // Check first so the fault precedes any AI round-trip and the binding
    // is written all-or-nothing
    if vm.current_frame().locals.contains_key(&name) {
        vm.fail(EngineError::DuplicateDeclaration(name));
        return;
    }

    let value = match init {
        Some(expr) => eval_or_suspend!(vm, eval_root(&expr, vm, annotation, &done)),
        None => Val::Null,
    };

    let var = Variable {
        value,
        annotation,
        is_const: var_kind == VarKind::Const,
    };
    if let Err(e) = vm.declare(&name, var) {
        vm.fail(e);
        return;
    }
    vm.instructions.pop();
}

/// Execute an Assign instruction
pub fn execute_assign(vm: &mut Vm, var: String, value: Expr, done: Vec<Val>) {
    // Resolve the target first: an undefined or const target fails before
    // any AI round-trip, and the declared type drives coercion
    let target = vm.lookup(&var).map(|v| (v.is_const, v.annotation));
    let annotation = match target {
        Some((true, _)) => {
            vm.fail(EngineError::ConstReassignment(var));
            return;
        }
        Some((false, annotation)) => annotation,
        None => {
            vm.fail(EngineError::UndefinedVariable(var));
            return;
        }
    };

    let val = eval_or_suspend!(vm, eval_root(&value, vm, annotation, &done));

    if let Err(e) = vm.assign(&var, val) {
        vm.fail(e);
        return;
    }
    vm.instructions.pop();
}

/// Execute an expression statement; its value becomes `last_result`
pub fn execute_expr_stmt(vm: &mut Vm, expr: Expr, done: Vec<Val>) {
    let val = eval_or_suspend!(vm, eval_root(&expr, vm, None, &done));
    vm.last_result = val;
    vm.instructions.pop();
}

/// Execute a Return instruction: evaluate, then unwind to the caller
pub fn execute_return(vm: &mut Vm, value: Option<Expr>, done: Vec<Val>) {
    let val = match value {
        Some(expr) => eval_or_suspend!(vm, eval_root(&expr, vm, None, &done)),
        None => Val::Null,
    };
    vm.instructions.pop();
    vm.instructions.push(Instruction::Unwind {
        kind: UnwindKind::Return(val),
    });
}

/// Execute an If instruction: evaluate the test, push the taken branch
pub fn execute_if(
    vm: &mut Vm,
    test: Expr,
    then_s: Box<Stmt>,
    else_s: Option<Box<Stmt>>,
    done: Vec<Val>,
) {
    let test_val = eval_or_suspend!(vm, eval_root(&test, vm, None, &done));
    vm.instructions.pop();
    if test_val.is_truthy() {
        vm.instructions.push(Instruction::Stmt { stmt: *then_s });
    } else if let Some(else_stmt) = else_s {
        vm.instructions.push(Instruction::Stmt { stmt: *else_stmt });
    }
}

/// Execute a While instruction
///
/// The instruction stays on the stack across iterations and is the
/// boundary `break`/`continue` unwind to.
pub fn execute_while(vm: &mut Vm, test: Expr, body: Box<Stmt>, done: Vec<Val>) {
    let test_val = eval_or_suspend!(vm, eval_root(&test, vm, None, &done));
    if !test_val.is_truthy() {
        vm.instructions.pop();
        return;
    }

    // A compress-mode body shares one region mark across iterations
    let loop_mark = match body.as_ref() {
        Stmt::Block {
            mode: ContextMode::Compress,
            ..
        } => Some(loop_entry_mark(vm)),
        _ => None,
    };

    // Fresh sub-results for the next test evaluation
    if let Some(Instruction::While { done, mark, .. }) = vm.instructions.last_mut() {
        done.clear();
        if loop_mark.is_some() {
            *mark = loop_mark;
        }
    }
    push_loop_body(vm, &body, loop_mark);
}

/// First-iteration entry mark for a compress-mode loop body
fn loop_entry_mark(vm: &Vm) -> usize {
    let recorded = match vm.instructions.last() {
        Some(Instruction::While { mark, .. }) | Some(Instruction::ForIn { mark, .. }) => *mark,
        _ => None,
    };
    recorded.unwrap_or_else(|| vm.current_frame().entries.len())
}

/// Push one loop-body iteration, threading the compress region mark
fn push_loop_body(vm: &mut Vm, body: &Stmt, mark: Option<usize>) {
    match body {
        Stmt::Block { body, mode } => {
            vm.instructions.push(Instruction::ExitBlock {
                mode: *mode,
                done: Vec::new(),
            });
            vm.push_stmts(body);
            vm.instructions.push(Instruction::EnterBlock { mode: *mode, mark });
        }
        other => vm.instructions.push(Instruction::Stmt {
            stmt: other.clone(),
        }),
    }
}

/// Execute a ForIn instruction
///
/// First step evaluates the iterable; each following step opens a block
/// scope, binds the element, and pushes the body statements.
pub fn execute_for_in(
    vm: &mut Vm,
    binding: String,
    iterable: Expr,
    body: Box<Stmt>,
    items: Option<Vec<Val>>,
    idx: usize,
    done: Vec<Val>,
) {
    let Some(items) = items else {
        let val = eval_or_suspend!(vm, eval_root(&iterable, vm, None, &done));
        match val {
            Val::List(list) => {
                if let Some(Instruction::ForIn { items, done, .. }) = vm.instructions.last_mut() {
                    *items = Some(list);
                    done.clear();
                }
            }
            other => vm.fail(EngineError::TypeError(format!(
                "cannot iterate over {} value",
                other.type_name()
            ))),
        }
        return;
    };

    if idx >= items.len() {
        vm.instructions.pop();
        return;
    }

    let element = items[idx].clone();
    let (inner, mode) = match *body {
        Stmt::Block { ref body, mode } => (body.clone(), mode),
        ref other => (vec![other.clone()], ContextMode::Verbose),
    };
    let loop_mark = if mode == ContextMode::Compress {
        Some(loop_entry_mark(vm))
    } else {
        None
    };

    if let Some(Instruction::ForIn { idx, mark, .. }) = vm.instructions.last_mut() {
        *idx += 1;
        if loop_mark.is_some() {
            *mark = loop_mark;
        }
    }

    // The binding lives inside the iteration's block scope
    vm.enter_block_at(mode, loop_mark);
    if let Err(e) = vm.declare(&binding, Variable::new(element)) {
        vm.fail(e);
        return;
    }
    vm.instructions.push(Instruction::ExitBlock {
        mode,
        done: Vec::new(),
    });
    vm.push_stmts(&inner);
}

/* ===================== Block boundaries ===================== */

/// Execute an EnterBlock instruction
pub fn execute_enter_block(vm: &mut Vm, mode: ContextMode, mark: Option<usize>) {
    vm.instructions.pop();
    vm.enter_block_at(mode, mark);
}

/// Execute an ExitBlock instruction
///
/// A compress-mode block with accumulated entries pays one summarization
/// round first; the summary arrives through the `done` queue and replaces
/// the raw entries.
pub fn execute_exit_block(vm: &mut Vm, mode: ContextMode, done: Vec<Val>) {
    if mode == ContextMode::Compress && done.is_empty() {
        if let Some(prompt) = context::build_compress_prompt(vm) {
            vm.instructions.push(Instruction::CallAi {
                request: PendingAi {
                    kind: AiOpKind::Compress,
                    prompt,
                    model: None,
                    target: Some(TypeAnnotation::Text),
                    tools: Vec::new(),
                    scope: ContextScope::Local,
                    args: Vec::new(),
                    history: Vec::new(),
                    max_rounds: 1,
                },
            });
            return;
        }
        // Nothing accumulated: exit without paying the round-trip
    }

    let summary = done.first().map(|v| v.prompt_text());
    vm.exit_block(summary);
    vm.instructions.pop();
}

/* ===================== Calls and suspensions ===================== */

/// Execute a CallFunction instruction
///
/// First step pushes the callee frame and body; the instruction stays on
/// the stack as the function boundary marker. It executes again only when
/// the body ran off the end without `return`, an implicit null return.
pub fn execute_call_function(vm: &mut Vm, name: String, args: Vec<Val>, frame_pushed: bool) {
    if frame_pushed {
        vm.pop_frame();
        vm.instructions.pop();
        vm.push_sub_result(Val::Null);
        return;
    }

    let decl = match vm.functions.get(&name) {
        Some(Callable::Function { decl, .. }) => decl.clone(),
        _ => {
            vm.fail(EngineError::Internal(format!(
                "call to unresolved function '{}'",
                name
            )));
            return;
        }
    };

    let mut frame = Frame::new(decl.name.clone());
    for (i, param) in decl.params.iter().enumerate() {
        let value = args.get(i).cloned().unwrap_or(Val::Null);
        frame.entries.push(FrameEntry::Variable {
            name: param.clone(),
            annotation: None,
            value: None,
        });
        frame.locals.insert(param.clone(), Variable::new(value));
    }

    if let Some(Instruction::CallFunction { frame_pushed, .. }) = vm.instructions.last_mut() {
        *frame_pushed = true;
    }
    vm.push_frame(frame);
    vm.push_stmts(&decl.body);
}

/// Execute a CallAi instruction: record the pending request and pause
///
/// No network I/O happens here or anywhere in the engine; the driver
/// performs the request and resumes.
pub fn execute_call_ai(vm: &mut Vm, request: PendingAi) {
    vm.status = match request.kind {
        AiOpKind::Ask => RunStatus::AwaitingUser,
        _ => RunStatus::AwaitingAi,
    };
    vm.pending = Some(PendingRequest::Ai { request });
}

/// Execute an AwaitUser instruction: pause for human input
pub fn execute_await_user(vm: &mut Vm, prompt: String, target: Option<TypeAnnotation>) {
    vm.status = RunStatus::AwaitingUser;
    vm.pending = Some(PendingRequest::Ai {
        request: PendingAi {
            kind: AiOpKind::Ask,
            prompt,
            model: None,
            target,
            tools: Vec::new(),
            scope: ContextScope::Local,
            args: Vec::new(),
            history: Vec::new(),
            max_rounds: 1,
        },
    });
}

/// Execute an EvalHostCode instruction: pause for the driver's sandbox
pub fn execute_eval_host_code(vm: &mut Vm, params: Vec<String>, body: String, args: Vec<Val>) {
    vm.status = RunStatus::AwaitingHostEval;
    vm.pending = Some(PendingRequest::HostEval { params, body, args });
}

/// Push the suspension instruction for an evaluation need
fn push_need(vm: &mut Vm, need: Need) {
    match need {
        Need::Ai(request) if request.kind == AiOpKind::Ask => {
            vm.instructions.push(Instruction::AwaitUser {
                prompt: request.prompt,
                target: request.target,
            });
        }
        Need::Ai(request) => {
            vm.instructions.push(Instruction::CallAi { request });
        }
        Need::Call { name, args } => {
            vm.instructions.push(Instruction::CallFunction {
                name,
                args,
                frame_pushed: false,
            });
        }
        Need::Host { params, body, args } => {
            vm.instructions
                .push(Instruction::EvalHostCode { params, body, args });
        }
    }
}

/* ===================== Unwinding ===================== */

/// Execute an Unwind instruction
///
/// Pops instructions until the matching boundary, running block cleanups
/// on the way so scoping holds however a block was exited. Control flow is
/// data on the instruction stack, never a host exception.
pub fn execute_unwind(vm: &mut Vm, kind: UnwindKind) {
    vm.instructions.pop();

    loop {
        let Some(instr) = vm.instructions.pop() else {
            match &kind {
                // Top-level return finishes the program
                UnwindKind::Return(val) => {
                    vm.last_result = val.clone();
                }
                UnwindKind::Break | UnwindKind::Continue => {
                    vm.fail(EngineError::Internal(
                        "break/continue outside a loop".to_string(),
                    ));
                }
            }
            return;
        };

        match instr {
            // An exited block cleans up even when unwound through; a
            // compress block skips its summarization round in that case
            Instruction::ExitBlock { .. } => {
                vm.exit_block(None);
            }

            Instruction::While { .. } | Instruction::ForIn { .. } => match &kind {
                UnwindKind::Break => return,
                UnwindKind::Continue => {
                    vm.instructions.push(instr);
                    return;
                }
                UnwindKind::Return(_) => {}
            },

            Instruction::CallFunction {
                frame_pushed: true, ..
            } => match &kind {
                UnwindKind::Return(val) => {
                    vm.pop_frame();
                    vm.push_sub_result(val.clone());
                    return;
                }
                UnwindKind::Break | UnwindKind::Continue => {
                    vm.fail(EngineError::Internal(
                        "break/continue crossed a function boundary".to_string(),
                    ));
                    return;
                }
            },

            _ => {}
        }
    }
}
