//! Test helpers
//!
//! Programs come in as the front-end's JSON wire format and round-trip
//! through serde on the way in, so every test doubles as a check that its
//! program shape serializes.

use crate::executor::types::{Program, Stmt};
use crate::executor::{run_until_pause, Vm};

/// Parse a JSON statement list into a program
pub fn parse_program(json: &str) -> Program {
    let body: Vec<Stmt> = serde_json::from_str(json).expect("program JSON");
    Program { body }
}

/// Parse, round-trip through JSON, and build a VM
pub fn build_vm(json: &str) -> Vm {
    let program = parse_program(json);
    let text = serde_json::to_string(&program).expect("program serialization");
    let program: Program = serde_json::from_str(&text).expect("program deserialization");
    Vm::from_program(program)
}

/// Build and run a program to its first pause (or completion)
pub fn run_program(json: &str) -> Vm {
    let mut vm = build_vm(json);
    run_until_pause(&mut vm);
    vm
}
