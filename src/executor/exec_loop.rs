//! Core execution loop
//!
//! This module contains the step() function - the heart of the interpreter.
//! It advances exactly one instruction at a time, so a mid-expression
//! suspension is ordinary serializable state, not a position on the host
//! call stack.
//!
//! ## Function Organization
//! 1. run_until_pause() - the only "run for a while" primitive
//! 2. step() - single-instruction dispatch

use super::statements::{
    execute_assign, execute_await_user, execute_call_ai, execute_call_function, execute_declare,
    execute_enter_block, execute_eval_host_code, execute_exit_block, execute_expr_stmt,
    execute_for_in, execute_if, execute_return, execute_stmt, execute_unwind, execute_while,
};
use super::types::Instruction;
use super::vm::Vm;
use crate::types::RunStatus;

/* ===================== Public API ===================== */

/// Run the VM until the status leaves `Running`
///
/// Performs no I/O itself: it stops at the first AI/user/tool/host
/// boundary (or a terminal status) and returns control to the driver.
pub fn run_until_pause(vm: &mut Vm) {
    while vm.status == RunStatus::Running {
        step(vm);
    }
}

/// Execute exactly one atomic instruction
///
/// Pops the next unit of work and dispatches to its handler. An empty
/// instruction stack means the program ran off the end: the run is
/// complete and `last_result` holds the final expression value.
pub fn step(vm: &mut Vm) {
    if vm.status != RunStatus::Running {
        return;
    }

    // Clone the top instruction so handlers can borrow the VM freely
    let Some(instr) = vm.instructions.last().cloned() else {
        vm.status = RunStatus::Completed;
        return;
    };

    match instr {
        Instruction::Stmt { stmt } => execute_stmt(vm, stmt),

        Instruction::Declare {
            var_kind,
            name,
            annotation,
            init,
            done,
        } => execute_declare(vm, var_kind, name, annotation, init, done),

        Instruction::Assign { var, value, done } => execute_assign(vm, var, value, done),

        Instruction::ExprStmt { expr, done } => execute_expr_stmt(vm, expr, done),

        Instruction::Return { value, done } => execute_return(vm, value, done),

        Instruction::If {
            test,
            then_s,
            else_s,
            done,
        } => execute_if(vm, test, then_s, else_s, done),

        Instruction::While {
            test, body, done, ..
        } => execute_while(vm, test, body, done),

        Instruction::ForIn {
            binding,
            iterable,
            body,
            items,
            idx,
            done,
            ..
        } => execute_for_in(vm, binding, iterable, body, items, idx, done),

        Instruction::EnterBlock { mode, mark } => execute_enter_block(vm, mode, mark),

        Instruction::ExitBlock { mode, done } => execute_exit_block(vm, mode, done),

        Instruction::CallFunction {
            name,
            args,
            frame_pushed,
        } => execute_call_function(vm, name, args, frame_pushed),

        Instruction::CallAi { request } => execute_call_ai(vm, request),

        Instruction::AwaitUser { prompt, target } => execute_await_user(vm, prompt, target),

        Instruction::EvalHostCode { params, body, args } => {
            execute_eval_host_code(vm, params, body, args)
        }

        Instruction::Unwind { kind } => execute_unwind(vm, kind),
    }
}
