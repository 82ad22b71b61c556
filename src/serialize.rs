//! State serialization
//!
//! Converts a complete run state to and from a durable, self-describing
//! JSON document so a suspended run can outlive the process. The document
//! is versioned and fails closed on an unrecognized version. Modules are
//! referenced by resolved path (plus a content hash), never re-embedded;
//! deserialization rehydrates them through the loader.
//!
//! The correctness contract: a deserialized state fed back into
//! `step`/`run_until_pause` behaves identically, step for step, to the
//! original in-memory state.

use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::warn;

use crate::executor::types::{FrameEntry, Instruction, PendingRequest, UnwindKind, Val};
use crate::executor::vm::{Callable, FunctionOrigin};
use crate::executor::Vm;
use crate::module::{ModuleError, ModuleLoader, ModuleRef};

/// Document format marker
pub const STATE_FORMAT: &str = "aria-state";

/// Current document version
pub const STATE_VERSION: u64 = 1;

/// Serialization faults, fatal to the call but not to the process
#[derive(Debug, Error)]
pub enum SerializeError {
    /// A value in the state has no defined durable encoding
    #[error("unsupported value at {location}: {detail}")]
    UnsupportedValue { location: String, detail: String },

    /// The document's version is not one this build understands
    #[error("unrecognized state document version {found} (supported: {STATE_VERSION})")]
    UnrecognizedVersion { found: JsonValue },

    /// The document is not a state document, or its shape is broken
    #[error("malformed state document: {0}")]
    Malformed(String),

    /// A referenced module could not be rehydrated
    #[error("module rehydration failed: {0}")]
    Module(#[from] ModuleError),
}

/// Serialize a run state into a durable document
pub fn serialize_state(vm: &Vm) -> Result<JsonValue, SerializeError> {
    check_state_values(vm)?;

    let mut state = serde_json::to_value(vm).map_err(|e| SerializeError::Malformed(e.to_string()))?;

    // Module-origin function bodies rehydrate from their module files;
    // embedding them would duplicate module contents into every document
    if let Some(functions) = state.get_mut("functions").and_then(JsonValue::as_object_mut) {
        for callable in functions.values_mut() {
            let is_module_fn = callable.get("t").and_then(JsonValue::as_str) == Some("Function")
                && callable
                    .get("origin")
                    .and_then(|o| o.get("t"))
                    .and_then(JsonValue::as_str)
                    == Some("Module");
            if is_module_fn {
                callable["decl"]["body"] = json!([]);
            }
        }
    }

    Ok(json!({
        "format": STATE_FORMAT,
        "version": STATE_VERSION,
        "modules": vm.modules.refs(),
        "state": state,
    }))
}

/// Deserialize a state document back into a runnable state
///
/// `loader` is required when the document references modules; each
/// reference is re-resolved by path and imported function bodies are
/// restored from the reloaded exports.
pub fn deserialize_state(
    doc: &JsonValue,
    loader: Option<&ModuleLoader>,
) -> Result<Vm, SerializeError> {
    if doc.get("format").and_then(JsonValue::as_str) != Some(STATE_FORMAT) {
        return Err(SerializeError::Malformed(
            "missing aria-state format marker".to_string(),
        ));
    }

    // Fail closed: an unknown version is never guess-and-proceed
    let version = doc.get("version").cloned().unwrap_or(JsonValue::Null);
    if version.as_u64() != Some(STATE_VERSION) {
        return Err(SerializeError::UnrecognizedVersion { found: version });
    }

    let refs: Vec<ModuleRef> = serde_json::from_value(
        doc.get("modules").cloned().unwrap_or_else(|| json!([])),
    )
    .map_err(|e| SerializeError::Malformed(format!("modules section: {}", e)))?;

    let state = doc
        .get("state")
        .ok_or_else(|| SerializeError::Malformed("missing state section".to_string()))?;
    let mut vm: Vm = serde_json::from_value(state.clone())
        .map_err(|e| SerializeError::Malformed(format!("state section: {}", e)))?;

    if !refs.is_empty() {
        let loader = loader.ok_or_else(|| {
            SerializeError::Malformed(
                "document references modules but no loader was provided".to_string(),
            )
        })?;
        for module_ref in &refs {
            let entry = loader.reload_module(&module_ref.path, module_ref.kind)?;
            if entry.version_hash != module_ref.version_hash {
                warn!(
                    path = module_ref.path.as_str(),
                    "module content changed since the state was serialized"
                );
            }
            vm.modules.insert(module_ref.path.clone(), entry);
        }

        // Restore imported function bodies from the reloaded modules
        let Vm {
            functions, modules, ..
        } = &mut vm;
        for callable in functions.values_mut() {
            if let Callable::Function {
                decl,
                origin: FunctionOrigin::Module { path },
            } = callable
            {
                let export = modules.function_export(path, &decl.name).ok_or_else(|| {
                    ModuleError::ExportNotFound {
                        name: decl.name.clone(),
                        module: path.clone(),
                    }
                })?;
                decl.body = export.body.clone();
            }
        }
    }

    Ok(vm)
}

/* ===================== Value validation ===================== */

/// Reject values with no durable encoding before writing anything
///
/// Concretely: non-finite numbers. JSON has no NaN/Infinity, and writing
/// them as null would silently change program behavior on resume.
fn check_state_values(vm: &Vm) -> Result<(), SerializeError> {
    check_val(&vm.last_result, "last_result")?;

    for frame in &vm.frames {
        for (name, var) in &frame.locals {
            check_val(&var.value, &format!("frame '{}' local '{}'", frame.name, name))?;
        }
        for entry in &frame.entries {
            if let FrameEntry::Variable {
                name,
                value: Some(val),
                ..
            } = entry
            {
                check_val(val, &format!("frame '{}' entry '{}'", frame.name, name))?;
            }
        }
    }

    for (i, instr) in vm.instructions.iter().enumerate() {
        let location = format!("instruction {}", i);
        for val in instruction_values(instr) {
            check_val(val, &location)?;
        }
    }

    if let Some(pending) = &vm.pending {
        let vals: &[Val] = match pending {
            PendingRequest::Ai { request } => &request.args,
            PendingRequest::ToolEval { request, .. } => &request.args,
            PendingRequest::HostEval { args, .. } => args,
        };
        for val in vals {
            check_val(val, "pending request")?;
        }
    }

    Ok(())
}

/// Collect the value payloads an instruction carries
fn instruction_values(instr: &Instruction) -> Vec<&Val> {
    let mut vals: Vec<&Val> = Vec::new();
    match instr {
        Instruction::Declare { done, .. }
        | Instruction::Assign { done, .. }
        | Instruction::ExprStmt { done, .. }
        | Instruction::Return { done, .. }
        | Instruction::If { done, .. }
        | Instruction::While { done, .. }
        | Instruction::ExitBlock { done, .. } => vals.extend(done),
        Instruction::ForIn { items, done, .. } => {
            vals.extend(done);
            if let Some(items) = items {
                vals.extend(items);
            }
        }
        Instruction::CallFunction { args, .. } => vals.extend(args),
        Instruction::CallAi { request } => vals.extend(&request.args),
        Instruction::EvalHostCode { args, .. } => vals.extend(args),
        Instruction::Unwind {
            kind: UnwindKind::Return(val),
        } => vals.push(val),
        Instruction::Stmt { .. }
        | Instruction::EnterBlock { .. }
        | Instruction::AwaitUser { .. }
        | Instruction::Unwind { .. } => {}
    }
    vals
}

fn check_val(val: &Val, location: &str) -> Result<(), SerializeError> {
    match val {
        Val::Num(n) if !n.is_finite() => Err(SerializeError::UnsupportedValue {
            location: location.to_string(),
            detail: format!("non-finite number {}", n),
        }),
        Val::List(items) => {
            for item in items {
                check_val(item, location)?;
            }
            Ok(())
        }
        Val::Obj(map) => {
            for item in map.values() {
                check_val(item, location)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
