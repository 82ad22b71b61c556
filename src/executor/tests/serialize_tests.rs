//! Serialization round-trip tests
//!
//! A deserialized state must behave identically, step for step, to the
//! state it was serialized from.

use std::sync::Arc;

use super::helpers::build_vm;
use crate::executor::{run_until_pause, step, Vm};
use crate::module::{JsonParser, ModuleLoader};
use crate::serialize::{deserialize_state, serialize_state};
use crate::types::{AiResponse, RunStatus};
use crate::executor::types::Val;

fn roundtrip(vm: &Vm) -> Vm {
    let doc = serialize_state(vm).expect("serialize");
    deserialize_state(&doc, None).expect("deserialize")
}

/// Step both states to completion in lockstep, comparing as we go
fn assert_identical_run(a: &mut Vm, b: &mut Vm) {
    loop {
        assert_eq!(a.status, b.status);
        assert_eq!(a.instructions, b.instructions);
        assert_eq!(a.frames, b.frames);
        assert_eq!(a.last_result, b.last_result);
        if a.status != RunStatus::Running {
            break;
        }
        step(a);
        step(b);
    }
}

#[test]
fn paused_state_resumes_identically_after_roundtrip() {
    let source = r#"[
        {"t": "Declare", "var_kind": "Let", "name": "base", "init": {"t": "LitNum", "v": 10}},
        {"t": "Declare", "var_kind": "Let", "name": "y", "annotation": "number",
         "init": {"t": "Do", "prompt": {"t": "LitText", "v": "pick a number"}}},
        {"t": "Expr", "expr": {"t": "Binary", "op": "Add",
         "left": {"t": "Ident", "name": "base"}, "right": {"t": "Ident", "name": "y"}}}
    ]"#;

    let mut original = build_vm(source);
    run_until_pause(&mut original);
    assert_eq!(original.status, RunStatus::AwaitingAi);

    let mut restored = roundtrip(&original);
    assert_eq!(restored.status, RunStatus::AwaitingAi);
    assert_eq!(restored.pending, original.pending);

    original
        .resume_with_ai_response(AiResponse::text("32"))
        .unwrap();
    restored
        .resume_with_ai_response(AiResponse::text("32"))
        .unwrap();

    assert_identical_run(&mut original, &mut restored);
    assert_eq!(original.status, RunStatus::Completed);
    assert_eq!(original.last_result, Val::Num(42.0));
}

#[test]
fn mid_loop_state_survives_a_roundtrip() {
    let source = r#"[
        {"t": "Declare", "var_kind": "Let", "name": "i", "init": {"t": "LitNum", "v": 0}},
        {"t": "Declare", "var_kind": "Let", "name": "total", "init": {"t": "LitNum", "v": 0}},
        {"t": "While", "test": {"t": "Binary", "op": "Lt",
            "left": {"t": "Ident", "name": "i"}, "right": {"t": "LitNum", "v": 4}},
         "body": {"t": "Block", "body": [
            {"t": "Assign", "var": "i", "value": {"t": "Binary", "op": "Add",
             "left": {"t": "Ident", "name": "i"}, "right": {"t": "LitNum", "v": 1}}},
            {"t": "Declare", "var_kind": "Let", "name": "step_size", "annotation": "number",
             "init": {"t": "Do", "prompt": {"t": "LitText", "v": "step size"}}},
            {"t": "Assign", "var": "total", "value": {"t": "Binary", "op": "Add",
             "left": {"t": "Ident", "name": "total"}, "right": {"t": "Ident", "name": "step_size"}}}
         ]}},
        {"t": "Expr", "expr": {"t": "Ident", "name": "total"}}
    ]"#;

    let mut vm = build_vm(source);
    // Serialize at a different pause each iteration, resuming the restored
    // copy each time; the state is durable at every boundary
    loop {
        run_until_pause(&mut vm);
        match vm.status {
            RunStatus::AwaitingAi => {
                vm = roundtrip(&vm);
                vm.resume_with_ai_response(AiResponse::text("2")).unwrap();
            }
            RunStatus::Completed => break,
            other => panic!("unexpected status {:?}", other),
        }
    }
    assert_eq!(vm.last_result, Val::Num(8.0));
}

#[test]
fn tool_conversation_state_survives_a_roundtrip() {
    let mut vm = build_vm(
        r#"[{"t": "Declare", "var_kind": "Let", "name": "answer",
             "init": {"t": "Do", "prompt": {"t": "LitText", "v": "look it up"},
                      "tools": ["search"]}}]"#,
    );
    run_until_pause(&mut vm);
    vm.resume_with_ai_response(AiResponse {
        content: String::new(),
        parsed_value: None,
        tool_calls: vec![crate::types::ToolCall {
            id: "c1".into(),
            name: "search".into(),
            arguments: serde_json::json!({"q": "rust"}),
        }],
        usage: None,
        stop_reason: crate::types::StopReason::ToolUse,
    })
    .unwrap();
    assert_eq!(vm.status, RunStatus::AwaitingToolEval);

    // The whole conversation state, calls included, crosses the boundary
    let mut restored = roundtrip(&vm);
    assert_eq!(restored.pending, vm.pending);

    restored
        .resume_with_tool_results(vec![crate::types::ToolCallResult::ok(
            "c1",
            serde_json::json!("found it"),
        )])
        .unwrap();
    restored
        .resume_with_ai_response(AiResponse::text("it is found"))
        .unwrap();
    run_until_pause(&mut restored);
    assert_eq!(restored.status, RunStatus::Completed);
    assert_eq!(
        restored.get_value("answer"),
        Some(Val::Text("it is found".into()))
    );
}

#[test]
fn module_functions_rehydrate_by_path_not_by_embedding() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("helper.aria"),
        r#"[{"t": "FunctionDecl", "decl": {"name": "double", "params": ["n"], "body": [
            {"t": "Return", "value": {"t": "Binary", "op": "Mul",
             "left": {"t": "Ident", "name": "n"}, "right": {"t": "LitNum", "v": 2}}}
        ]}}]"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("main.aria"),
        r#"[
            {"t": "Import", "names": [{"name": "double"}], "from": "helper"},
            {"t": "Declare", "var_kind": "Let", "name": "y", "annotation": "number",
             "init": {"t": "Do", "prompt": {"t": "LitText", "v": "pick"}}},
            {"t": "Expr", "expr": {"t": "Call", "callee": "double",
             "args": [{"t": "Ident", "name": "y"}]}}
        ]"#,
    )
    .unwrap();

    let loader = ModuleLoader::new(Arc::new(JsonParser));
    let loaded = loader.load_program(&dir.path().join("main.aria")).unwrap();
    let mut vm = Vm::new(loaded);
    run_until_pause(&mut vm);
    assert_eq!(vm.status, RunStatus::AwaitingAi);

    let doc = serialize_state(&vm).unwrap();

    // The document references the module by path; the body is not embedded
    assert_eq!(doc["modules"].as_array().unwrap().len(), 1);
    assert_eq!(doc["state"]["functions"]["double"]["decl"]["body"], serde_json::json!([]));

    let mut restored = deserialize_state(&doc, Some(&loader)).unwrap();
    restored
        .resume_with_ai_response(AiResponse::text("21"))
        .unwrap();
    run_until_pause(&mut restored);
    assert_eq!(restored.status, RunStatus::Completed);
    assert_eq!(restored.last_result, Val::Num(42.0));
}

#[test]
fn interaction_log_round_trips() {
    let mut vm = build_vm(
        r#"[{"t": "Declare", "var_kind": "Let", "name": "a",
             "init": {"t": "Do", "prompt": {"t": "LitText", "v": "one"}}}]"#,
    );
    run_until_pause(&mut vm);
    vm.resume_with_ai_response(AiResponse::text("1")).unwrap();
    run_until_pause(&mut vm);

    let restored = roundtrip(&vm);
    assert_eq!(restored.interactions(), vm.interactions());
}
