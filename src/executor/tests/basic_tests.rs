//! Basic execution tests: literals, operators, last_result

use super::helpers::{build_vm, run_program};
use crate::executor::types::Val;
use crate::executor::{run_until_pause, step};
use crate::types::RunStatus;

#[test]
fn declare_assign_read_yields_two() {
    let vm = run_program(
        r#"[
            {"t": "Declare", "var_kind": "Let", "name": "x", "init": {"t": "LitNum", "v": 1}},
            {"t": "Assign", "var": "x", "value": {"t": "Binary", "op": "Add",
             "left": {"t": "Ident", "name": "x"}, "right": {"t": "LitNum", "v": 1}}},
            {"t": "Expr", "expr": {"t": "Ident", "name": "x"}}
        ]"#,
    );

    assert_eq!(vm.status, RunStatus::Completed);
    assert_eq!(vm.last_result, Val::Num(2.0));
    assert!(vm.pending.is_none());
}

#[test]
fn literal_expressions_become_last_result() {
    let cases = [
        (r#"{"t": "LitNum", "v": 42}"#, Val::Num(42.0)),
        (r#"{"t": "LitBool", "v": true}"#, Val::Bool(true)),
        (r#"{"t": "LitText", "v": "hi"}"#, Val::Text("hi".into())),
        (r#"{"t": "LitNull"}"#, Val::Null),
    ];
    for (expr, expected) in cases {
        let vm = run_program(&format!(r#"[{{"t": "Expr", "expr": {}}}]"#, expr));
        assert_eq!(vm.status, RunStatus::Completed);
        assert_eq!(vm.last_result, expected);
    }
}

#[test]
fn arithmetic_and_precedence_via_nesting() {
    // (1 + 2) * 3 - 4 / 2
    let vm = run_program(
        r#"[{"t": "Expr", "expr": {"t": "Binary", "op": "Sub",
            "left": {"t": "Binary", "op": "Mul",
                "left": {"t": "Binary", "op": "Add",
                    "left": {"t": "LitNum", "v": 1}, "right": {"t": "LitNum", "v": 2}},
                "right": {"t": "LitNum", "v": 3}},
            "right": {"t": "Binary", "op": "Div",
                "left": {"t": "LitNum", "v": 4}, "right": {"t": "LitNum", "v": 2}}}}]"#,
    );
    assert_eq!(vm.last_result, Val::Num(7.0));
}

#[test]
fn text_concatenation_stringifies_the_other_operand() {
    let vm = run_program(
        r#"[{"t": "Expr", "expr": {"t": "Binary", "op": "Add",
            "left": {"t": "LitText", "v": "n = "}, "right": {"t": "LitNum", "v": 3}}}]"#,
    );
    assert_eq!(vm.last_result, Val::Text("n = 3".into()));
}

#[test]
fn short_circuit_forms_return_operand_values() {
    let vm = run_program(
        r#"[{"t": "Expr", "expr": {"t": "Binary", "op": "Or",
            "left": {"t": "LitText", "v": ""}, "right": {"t": "LitNum", "v": 5}}}]"#,
    );
    assert_eq!(vm.last_result, Val::Num(5.0));

    let vm = run_program(
        r#"[{"t": "Expr", "expr": {"t": "Binary", "op": "And",
            "left": {"t": "LitBool", "v": false}, "right": {"t": "LitNum", "v": 5}}}]"#,
    );
    assert_eq!(vm.last_result, Val::Bool(false));
}

#[test]
fn member_and_index_access() {
    let vm = run_program(
        r#"[
            {"t": "Declare", "var_kind": "Let", "name": "obj", "init":
                {"t": "LitObj", "properties": [["a", {"t": "LitNum", "v": 1}]]}},
            {"t": "Declare", "var_kind": "Let", "name": "arr", "init":
                {"t": "LitList", "elements": [{"t": "LitNum", "v": 10}, {"t": "LitNum", "v": 20}]}},
            {"t": "Expr", "expr": {"t": "Binary", "op": "Add",
                "left": {"t": "Member", "object": {"t": "Ident", "name": "obj"}, "property": "a"},
                "right": {"t": "Index", "object": {"t": "Ident", "name": "arr"},
                          "index": {"t": "LitNum", "v": 1}}}}
        ]"#,
    );
    assert_eq!(vm.last_result, Val::Num(21.0));
}

#[test]
fn array_length_property() {
    let vm = run_program(
        r#"[{"t": "Expr", "expr": {"t": "Member",
            "object": {"t": "LitList", "elements": [{"t": "LitNum", "v": 1}, {"t": "LitNum", "v": 2}]},
            "property": "length"}}]"#,
    );
    assert_eq!(vm.last_result, Val::Num(2.0));
}

#[test]
fn stepping_in_a_loop_matches_run_until_pause() {
    let source = r#"[
        {"t": "Declare", "var_kind": "Let", "name": "acc", "init": {"t": "LitNum", "v": 0}},
        {"t": "While", "test": {"t": "Binary", "op": "Lt",
            "left": {"t": "Ident", "name": "acc"}, "right": {"t": "LitNum", "v": 10}},
         "body": {"t": "Block", "body": [
            {"t": "Assign", "var": "acc", "value": {"t": "Binary", "op": "Add",
             "left": {"t": "Ident", "name": "acc"}, "right": {"t": "LitNum", "v": 3}}}
         ]}},
        {"t": "Expr", "expr": {"t": "Ident", "name": "acc"}}
    ]"#;

    let mut by_run = build_vm(source);
    run_until_pause(&mut by_run);

    let mut by_step = build_vm(source);
    while by_step.status == RunStatus::Running {
        step(&mut by_step);
    }

    assert_eq!(by_run.status, RunStatus::Completed);
    assert_eq!(by_run.last_result, by_step.last_result);
    assert_eq!(by_run.last_result, Val::Num(12.0));
}

#[test]
fn step_on_a_terminal_state_is_a_no_op() {
    let mut vm = run_program(r#"[{"t": "Expr", "expr": {"t": "LitNum", "v": 1}}]"#);
    assert_eq!(vm.status, RunStatus::Completed);
    step(&mut vm);
    assert_eq!(vm.status, RunStatus::Completed);
    assert_eq!(vm.last_result, Val::Num(1.0));
}
