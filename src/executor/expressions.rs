//! Expression evaluation
//!
//! Evaluates expressions to values without performing any I/O. An AI
//! operation, user-function call, or host call is a *suspendable site*:
//! evaluation stops there and reports what it needs; the owning instruction
//! suspends, and on re-execution the site consumes its completed result
//! from the instruction's `done` queue. Sites are visited in deterministic
//! left-to-right order, so the queue pairs results to sites by position
//! even when one expression contains several of them.

use super::errors::EngineError;
use super::types::ast::{BinaryOp, ContextScope, UnaryOp};
use super::types::{Expr, PendingAi, TypeAnnotation, Val};
use super::vm::{Callable, Vm};
use crate::types::AiOpKind;

/// What a suspendable site needs before evaluation can continue
#[derive(Debug, Clone, PartialEq)]
pub enum Need {
    /// A provider response (or user input for `ask`)
    Ai(PendingAi),
    /// A user-defined function invocation
    Call { name: String, args: Vec<Val> },
    /// A host-language function evaluation
    Host {
        params: Vec<String>,
        body: String,
        args: Vec<Val>,
    },
}

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum EvalResult {
    /// Expression evaluated to a value
    Value(Val),
    /// Evaluation stopped at a suspendable site
    Needs(Need),
    /// Evaluation failed; engine faults are fatal
    Throw(EngineError),
}

/// Propagate non-value outcomes out of a sub-evaluation
macro_rules! eval_value {
    ($result:expr) => {
        match $result {
            EvalResult::Value(v) => v,
            other => return other,
        }
    };
}

/// Evaluate a whole expression against the current state
///
/// `target` is the declared type of the destination variable, if any; it
/// flows into an AI site only when that site *is* the whole expression.
/// `done` is the owning instruction's completed-sub-result queue.
pub fn eval_root(
    expr: &Expr,
    vm: &Vm,
    target: Option<TypeAnnotation>,
    done: &[Val],
) -> EvalResult {
    let mut cursor = SiteCursor { next: 0, done };
    eval_expr(expr, vm, target, &mut cursor, true)
}

/// Position in the `done` queue as sites are visited in order
struct SiteCursor<'a> {
    next: usize,
    done: &'a [Val],
}

impl<'a> SiteCursor<'a> {
    /// Consume the next completed sub-result, if this site already ran
    fn take(&mut self) -> Option<Val> {
        let val = self.done.get(self.next).cloned();
        if val.is_some() {
            self.next += 1;
        }
        val
    }
}

fn eval_expr(
    expr: &Expr,
    vm: &Vm,
    target: Option<TypeAnnotation>,
    sites: &mut SiteCursor<'_>,
    is_root: bool,
) -> EvalResult {
    match expr {
        Expr::LitBool { v } => EvalResult::Value(Val::Bool(*v)),
        Expr::LitNum { v } => EvalResult::Value(Val::Num(*v)),
        Expr::LitText { v } => EvalResult::Value(Val::Text(v.clone())),
        Expr::LitNull => EvalResult::Value(Val::Null),

        Expr::LitList { elements } => {
            let mut vals = Vec::with_capacity(elements.len());
            for elem in elements {
                vals.push(eval_value!(eval_expr(elem, vm, None, sites, false)));
            }
            EvalResult::Value(Val::List(vals))
        }

        Expr::LitObj { properties } => {
            let mut map = std::collections::HashMap::new();
            for (key, val_expr) in properties {
                let v = eval_value!(eval_expr(val_expr, vm, None, sites, false));
                map.insert(key.clone(), v);
            }
            EvalResult::Value(Val::Obj(map))
        }

        Expr::Ident { name } => match vm.get(name) {
            Ok(val) => EvalResult::Value(val),
            Err(e) => EvalResult::Throw(e),
        },

        Expr::Member { object, property } => {
            let obj = eval_value!(eval_expr(object, vm, None, sites, false));
            match obj {
                Val::Obj(map) => match map.get(property) {
                    Some(val) => EvalResult::Value(val.clone()),
                    None => EvalResult::Throw(EngineError::TypeError(format!(
                        "property '{}' not found on object",
                        property
                    ))),
                },
                Val::List(items) if property == "length" => {
                    EvalResult::Value(Val::Num(items.len() as f64))
                }
                Val::Text(s) if property == "length" => {
                    EvalResult::Value(Val::Num(s.chars().count() as f64))
                }
                other => EvalResult::Throw(EngineError::TypeError(format!(
                    "cannot access property '{}' on {} value",
                    property,
                    other.type_name()
                ))),
            }
        }

        Expr::Index { object, index } => {
            let obj = eval_value!(eval_expr(object, vm, None, sites, false));
            let idx = eval_value!(eval_expr(index, vm, None, sites, false));
            match (obj, idx) {
                (Val::List(items), Val::Num(n)) => {
                    let i = n as usize;
                    if n.fract() == 0.0 && n >= 0.0 && i < items.len() {
                        EvalResult::Value(items[i].clone())
                    } else {
                        EvalResult::Throw(EngineError::TypeError(format!(
                            "index {} out of bounds for array of length {}",
                            n,
                            items.len()
                        )))
                    }
                }
                (Val::Obj(map), Val::Text(key)) => match map.get(&key) {
                    Some(val) => EvalResult::Value(val.clone()),
                    None => EvalResult::Throw(EngineError::TypeError(format!(
                        "property '{}' not found on object",
                        key
                    ))),
                },
                (obj, idx) => EvalResult::Throw(EngineError::TypeError(format!(
                    "cannot index {} with {}",
                    obj.type_name(),
                    idx.type_name()
                ))),
            }
        }

        Expr::Unary { op, operand } => {
            let v = eval_value!(eval_expr(operand, vm, None, sites, false));
            match op {
                UnaryOp::Not => EvalResult::Value(Val::Bool(!v.is_truthy())),
                UnaryOp::Neg => match v {
                    Val::Num(n) => EvalResult::Value(Val::Num(-n)),
                    other => EvalResult::Throw(EngineError::TypeError(format!(
                        "cannot negate {} value",
                        other.type_name()
                    ))),
                },
            }
        }

        Expr::Binary { op, left, right } => {
            let l = eval_value!(eval_expr(left, vm, None, sites, false));
            // Short-circuit forms return an operand value, not a bool
            match op {
                BinaryOp::And if !l.is_truthy() => return EvalResult::Value(l),
                BinaryOp::Or if l.is_truthy() => return EvalResult::Value(l),
                _ => {}
            }
            let r = eval_value!(eval_expr(right, vm, None, sites, false));
            match op {
                BinaryOp::And | BinaryOp::Or => EvalResult::Value(r),
                _ => match eval_binary(*op, &l, &r) {
                    Ok(v) => EvalResult::Value(v),
                    Err(e) => EvalResult::Throw(e),
                },
            }
        }

        Expr::Call { callee, args } => {
            let mut argv = Vec::with_capacity(args.len());
            for arg in args {
                argv.push(eval_value!(eval_expr(arg, vm, None, sites, false)));
            }
            if let Some(val) = sites.take() {
                return EvalResult::Value(val);
            }
            match resolve_callee(vm, callee) {
                Ok(CalleeKind::Function(name)) => {
                    EvalResult::Needs(Need::Call { name, args: argv })
                }
                Ok(CalleeKind::Host { params, body }) => EvalResult::Needs(Need::Host {
                    params,
                    body,
                    args: argv,
                }),
                Err(e) => EvalResult::Throw(e),
            }
        }

        Expr::Do {
            prompt,
            model,
            tools,
            scope,
        } => {
            let prompt_val = eval_value!(eval_expr(prompt, vm, None, sites, false));
            if let Some(val) = sites.take() {
                return EvalResult::Value(val);
            }
            let model_cfg = match resolve_model(vm, model.as_deref()) {
                Ok(cfg) => cfg,
                Err(e) => return EvalResult::Throw(e),
            };
            let max_rounds = if tools.is_empty() {
                1
            } else {
                vm.policy.max_tool_rounds
            };
            EvalResult::Needs(Need::Ai(PendingAi {
                kind: AiOpKind::Do,
                prompt: prompt_val.prompt_text(),
                model: model_cfg,
                target: if is_root { target } else { None },
                tools: tools.clone(),
                scope: *scope,
                args: Vec::new(),
                history: Vec::new(),
                max_rounds,
            }))
        }

        Expr::Ask { prompt } => {
            let prompt_val = eval_value!(eval_expr(prompt, vm, None, sites, false));
            if let Some(val) = sites.take() {
                return EvalResult::Value(val);
            }
            EvalResult::Needs(Need::Ai(PendingAi {
                kind: AiOpKind::Ask,
                prompt: prompt_val.prompt_text(),
                model: None,
                target: if is_root { target } else { None },
                tools: Vec::new(),
                scope: ContextScope::Local,
                args: Vec::new(),
                history: Vec::new(),
                max_rounds: 1,
            }))
        }

        Expr::Vibe {
            prompt,
            model,
            tools,
            args,
        } => {
            let prompt_val = eval_value!(eval_expr(prompt, vm, None, sites, false));
            let mut argv = Vec::with_capacity(args.len());
            for arg in args {
                argv.push(eval_value!(eval_expr(arg, vm, None, sites, false)));
            }
            if let Some(val) = sites.take() {
                return EvalResult::Value(val);
            }
            let model_cfg = match resolve_model(vm, model.as_deref()) {
                Ok(cfg) => cfg,
                Err(e) => return EvalResult::Throw(e),
            };
            EvalResult::Needs(Need::Ai(PendingAi {
                kind: AiOpKind::Vibe,
                prompt: prompt_val.prompt_text(),
                model: model_cfg,
                target: None,
                tools: tools.clone(),
                scope: ContextScope::Global,
                args: argv,
                history: Vec::new(),
                max_rounds: vm.policy.max_tool_rounds,
            }))
        }
    }
}

/* ===================== Callee and model resolution ===================== */

enum CalleeKind {
    Function(String),
    Host { params: Vec<String>, body: String },
}

fn resolve_callee(vm: &Vm, name: &str) -> Result<CalleeKind, EngineError> {
    // A local binding shadows the function table (same order as `get`)
    if let Some(var) = vm.lookup(name) {
        return match &var.value {
            Val::FuncRef(target) => resolve_table(vm, target),
            other => Err(EngineError::NotCallable(format!(
                "{} ({})",
                name,
                other.type_name()
            ))),
        };
    }
    if vm.functions.contains_key(name) {
        return resolve_table(vm, name);
    }
    Err(EngineError::UndefinedVariable(name.to_string()))
}

fn resolve_table(vm: &Vm, name: &str) -> Result<CalleeKind, EngineError> {
    match vm.functions.get(name) {
        Some(Callable::Function { .. }) => Ok(CalleeKind::Function(name.to_string())),
        Some(Callable::Host { path, name: export }) => {
            match vm.modules.host_export(path, export) {
                Some(host) => Ok(CalleeKind::Host {
                    params: host.params.clone(),
                    body: host.body.clone(),
                }),
                None => Err(EngineError::Internal(format!(
                    "host export '{}' missing from module {}",
                    export, path
                ))),
            }
        }
        None => Err(EngineError::UndefinedVariable(name.to_string())),
    }
}

fn resolve_model(
    vm: &Vm,
    name: Option<&str>,
) -> Result<Option<super::types::ModelConfig>, EngineError> {
    let Some(name) = name else {
        return Ok(None);
    };
    match vm.get(name)? {
        Val::Model(cfg) => Ok(Some(cfg)),
        other => Err(EngineError::TypeError(format!(
            "'{}' is {} where a model reference was expected",
            name,
            other.type_name()
        ))),
    }
}

/* ===================== Operators ===================== */

fn eval_binary(op: BinaryOp, l: &Val, r: &Val) -> Result<Val, EngineError> {
    use BinaryOp::*;
    match op {
        Add => match (l, r) {
            (Val::Num(a), Val::Num(b)) => Ok(Val::Num(a + b)),
            (Val::Text(_), _) | (_, Val::Text(_)) => {
                Ok(Val::Text(format!("{}{}", l.prompt_text(), r.prompt_text())))
            }
            _ => Err(type_err(op, l, r)),
        },
        Sub | Mul | Div | Mod => match (l, r) {
            (Val::Num(a), Val::Num(b)) => Ok(Val::Num(match op {
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                Mod => a % b,
                _ => unreachable!(),
            })),
            _ => Err(type_err(op, l, r)),
        },
        Eq => Ok(Val::Bool(l == r)),
        Ne => Ok(Val::Bool(l != r)),
        Lt | Lte | Gt | Gte => match (l, r) {
            (Val::Num(a), Val::Num(b)) => Ok(Val::Bool(compare(op, a.partial_cmp(b)))),
            (Val::Text(a), Val::Text(b)) => Ok(Val::Bool(compare(op, a.partial_cmp(b)))),
            _ => Err(type_err(op, l, r)),
        },
        And | Or => unreachable!("short-circuit forms handled by the caller"),
    }
}

fn compare(op: BinaryOp, ordering: Option<std::cmp::Ordering>) -> bool {
    use std::cmp::Ordering::*;
    match (op, ordering) {
        (BinaryOp::Lt, Some(Less)) => true,
        (BinaryOp::Lte, Some(Less) | Some(Equal)) => true,
        (BinaryOp::Gt, Some(Greater)) => true,
        (BinaryOp::Gte, Some(Greater) | Some(Equal)) => true,
        _ => false,
    }
}

fn type_err(op: BinaryOp, l: &Val, r: &Val) -> EngineError {
    EngineError::TypeError(format!(
        "operator {:?} not defined for {} and {}",
        op,
        l.type_name(),
        r.type_name()
    ))
}
