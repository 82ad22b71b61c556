//! AI operation tests: pause/resume, coercion, ask, vibe, compress
//!
//! The engine never performs I/O; these tests play the driver's role and
//! resume paused states by hand.

use super::helpers::{build_vm, run_program};
use crate::executor::types::{FrameEntry, PendingRequest, TypeAnnotation, Val};
use crate::executor::vm::{Callable, FunctionOrigin, RedeclarePolicy};
use crate::executor::{errors, run_until_pause, EngineError};
use crate::module::JsonParser;
use crate::types::{AiOpKind, AiResponse, RunStatus};

const MODEL_DECL: &str = r#"{"t": "ModelDecl", "name": "default",
    "config": {"provider": "openai", "model": "gpt-test", "params": null}}"#;

fn pending_ai(vm: &crate::executor::Vm) -> &crate::executor::PendingAi {
    match vm.pending.as_ref().expect("pending request") {
        PendingRequest::Ai { request } => request,
        other => panic!("expected AI pending, got {:?}", other),
    }
}

#[test]
fn do_pauses_with_the_declared_target_type() {
    let mut vm = build_vm(&format!(
        r#"[
            {},
            {{"t": "Declare", "var_kind": "Let", "name": "y", "annotation": "number",
              "init": {{"t": "Do", "prompt": {{"t": "LitText", "v": "2+2"}},
                        "model": "default"}}}}
        ]"#,
        MODEL_DECL
    ));
    run_until_pause(&mut vm);

    assert_eq!(vm.status, RunStatus::AwaitingAi);
    let request = pending_ai(&vm);
    assert_eq!(request.kind, AiOpKind::Do);
    assert_eq!(request.prompt, "2+2");
    assert_eq!(request.target, Some(TypeAnnotation::Number));
    assert_eq!(request.max_rounds, 1);
    assert_eq!(
        request.model.as_ref().map(|m| m.model.as_str()),
        Some("gpt-test")
    );

    // Resuming with the string "4" yields the number 4, never the text
    vm.resume_with_ai_response(AiResponse::text("4")).unwrap();
    run_until_pause(&mut vm);

    assert_eq!(vm.status, RunStatus::Completed);
    assert_eq!(vm.get_value("y"), Some(Val::Num(4.0)));
}

#[test]
fn resume_in_the_wrong_status_is_rejected() {
    let mut vm = run_program(r#"[{"t": "Expr", "expr": {"t": "LitNum", "v": 1}}]"#);
    assert_eq!(vm.status, RunStatus::Completed);

    let err = vm
        .resume_with_ai_response(AiResponse::text("4"))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidResumeState(_)));
    // The terminal state is untouched
    assert_eq!(vm.status, RunStatus::Completed);
    assert_eq!(vm.last_result, Val::Num(1.0));
}

#[test]
fn coercion_failure_is_fatal() {
    let mut vm = build_vm(
        r#"[{"t": "Declare", "var_kind": "Let", "name": "y", "annotation": "number",
             "init": {"t": "Do", "prompt": {"t": "LitText", "v": "2+2"}}}]"#,
    );
    run_until_pause(&mut vm);

    let err = vm
        .resume_with_ai_response(AiResponse::text("four"))
        .unwrap_err();
    assert!(matches!(err, EngineError::TypeCoercion { .. }));
    assert_eq!(vm.status, RunStatus::Error);
    assert_eq!(vm.error.as_ref().unwrap().code, errors::TYPE_COERCION);
}

#[test]
fn prompt_interpolation_happens_before_the_pause() {
    let mut vm = build_vm(
        r#"[
            {"t": "Declare", "var_kind": "Let", "name": "n", "init": {"t": "LitNum", "v": 7}},
            {"t": "Expr", "expr": {"t": "Do", "prompt": {"t": "Binary", "op": "Add",
             "left": {"t": "LitText", "v": "double "}, "right": {"t": "Ident", "name": "n"}}}}
        ]"#,
    );
    run_until_pause(&mut vm);
    assert_eq!(pending_ai(&vm).prompt, "double 7");
}

#[test]
fn ask_pauses_for_the_user_and_coerces_the_reply() {
    let mut vm = build_vm(
        r#"[{"t": "Declare", "var_kind": "Let", "name": "age", "annotation": "number",
             "init": {"t": "Ask", "prompt": {"t": "LitText", "v": "how old?"}}}]"#,
    );
    run_until_pause(&mut vm);

    assert_eq!(vm.status, RunStatus::AwaitingUser);
    assert_eq!(pending_ai(&vm).kind, AiOpKind::Ask);

    vm.resume_with_user_input("30").unwrap();
    run_until_pause(&mut vm);

    assert_eq!(vm.status, RunStatus::Completed);
    assert_eq!(vm.get_value("age"), Some(Val::Num(30.0)));

    // The interaction is on the audit log and in the frame's entries
    assert_eq!(vm.interactions().len(), 1);
    assert_eq!(vm.interactions()[0].kind, AiOpKind::Ask);
    assert!(vm.frames[0]
        .entries
        .iter()
        .any(|e| matches!(e, FrameEntry::AiEvent { kind: AiOpKind::Ask, .. })));
}

#[test]
fn two_ai_ops_in_one_expression_resume_in_site_order() {
    let mut vm = build_vm(
        r#"[{"t": "Expr", "expr": {"t": "Binary", "op": "Add",
             "left": {"t": "Do", "prompt": {"t": "LitText", "v": "first"}},
             "right": {"t": "Do", "prompt": {"t": "LitText", "v": "second"}}}}]"#,
    );

    run_until_pause(&mut vm);
    assert_eq!(pending_ai(&vm).prompt, "first");
    vm.resume_with_ai_response(AiResponse::text("a")).unwrap();

    run_until_pause(&mut vm);
    assert_eq!(pending_ai(&vm).prompt, "second");
    vm.resume_with_ai_response(AiResponse::text("b")).unwrap();

    run_until_pause(&mut vm);
    assert_eq!(vm.status, RunStatus::Completed);
    assert_eq!(vm.last_result, Val::Text("ab".into()));
    assert_eq!(vm.interactions().len(), 2);
}

/* ===================== vibe ===================== */

const GENERATED_DOUBLE: &str = r#"{"name": "double", "params": ["n"], "body": [
    {"t": "Return", "value": {"t": "Binary", "op": "Mul",
     "left": {"t": "Ident", "name": "n"}, "right": {"t": "LitNum", "v": 2}}}
]}"#;

fn vibe_program() -> String {
    r#"[{"t": "Declare", "var_kind": "Let", "name": "r",
         "init": {"t": "Vibe", "prompt": {"t": "LitText", "v": "write a doubler"},
                  "args": [{"t": "LitNum", "v": 5}]}}]"#
        .to_string()
}

#[test]
fn vibe_splices_and_immediately_invokes() {
    let mut vm = build_vm(&vibe_program());
    run_until_pause(&mut vm);

    assert_eq!(vm.status, RunStatus::AwaitingAi);
    let request = pending_ai(&vm);
    assert_eq!(request.kind, AiOpKind::Vibe);
    assert_eq!(request.args, vec![Val::Num(5.0)]);

    vm.resume_with_generated_code(GENERATED_DOUBLE, &JsonParser)
        .unwrap();
    run_until_pause(&mut vm);

    assert_eq!(vm.status, RunStatus::Completed);
    assert_eq!(vm.get_value("r"), Some(Val::Num(10.0)));
    assert!(matches!(
        vm.functions.get("double"),
        Some(Callable::Function {
            origin: FunctionOrigin::Generated,
            ..
        })
    ));
}

#[test]
fn vibe_parse_failure_is_fatal_and_distinct() {
    let mut vm = build_vm(&vibe_program());
    run_until_pause(&mut vm);

    let err = vm
        .resume_with_generated_code("let x = ;", &JsonParser)
        .unwrap_err();
    assert!(matches!(err, EngineError::GeneratedCodeSyntax(_)));
    assert_eq!(vm.status, RunStatus::Error);
    assert_eq!(
        vm.error.as_ref().unwrap().code,
        errors::GENERATED_CODE_SYNTAX
    );
}

#[test]
fn vibe_redeclaration_honors_the_reject_policy() {
    let source = r#"[
        {"t": "FunctionDecl", "decl": {"name": "double", "params": ["n"],
         "body": [{"t": "Return", "value": {"t": "LitNum", "v": 0}}]}},
        {"t": "Declare", "var_kind": "Let", "name": "r",
         "init": {"t": "Vibe", "prompt": {"t": "LitText", "v": "write a doubler"},
                  "args": [{"t": "LitNum", "v": 5}]}}
    ]"#;

    // Default policy rejects the collision
    let mut vm = build_vm(source);
    run_until_pause(&mut vm);
    let err = vm
        .resume_with_generated_code(GENERATED_DOUBLE, &JsonParser)
        .unwrap_err();
    assert!(matches!(err, EngineError::GeneratedRedeclaration(_)));
    assert_eq!(vm.status, RunStatus::Error);

    // Overwrite policy splices over the old declaration
    let mut vm = build_vm(source);
    vm.policy.vibe_redeclare = RedeclarePolicy::Overwrite;
    run_until_pause(&mut vm);
    vm.resume_with_generated_code(GENERATED_DOUBLE, &JsonParser)
        .unwrap();
    run_until_pause(&mut vm);
    assert_eq!(vm.status, RunStatus::Completed);
    assert_eq!(vm.get_value("r"), Some(Val::Num(10.0)));
}

#[test]
fn do_with_an_undeclared_model_fails_before_pausing() {
    let vm = run_program(
        r#"[{"t": "Expr", "expr": {"t": "Do", "prompt": {"t": "LitText", "v": "hi"},
             "model": "nope"}}]"#,
    );
    assert_eq!(vm.status, RunStatus::Error);
    assert_eq!(vm.error.as_ref().unwrap().code, errors::UNDEFINED_VARIABLE);
}

/* ===================== compress ===================== */

#[test]
fn compress_loop_leaves_exactly_one_summary_entry() {
    let mut vm = build_vm(
        r#"[
            {"t": "Declare", "var_kind": "Let", "name": "i", "init": {"t": "LitNum", "v": 0}},
            {"t": "While", "test": {"t": "Binary", "op": "Lt",
                "left": {"t": "Ident", "name": "i"}, "right": {"t": "LitNum", "v": 2}},
             "body": {"t": "Block", "mode": "compress", "body": [
                {"t": "Assign", "var": "i", "value": {"t": "Binary", "op": "Add",
                 "left": {"t": "Ident", "name": "i"}, "right": {"t": "LitNum", "v": 1}}},
                {"t": "Declare", "var_kind": "Let", "name": "partial",
                 "init": {"t": "Ident", "name": "i"}}
             ]}}
        ]"#,
    );

    // Each iteration exit pays one summarization round
    let mut rounds = 0;
    loop {
        run_until_pause(&mut vm);
        match vm.status {
            RunStatus::AwaitingAi => {
                let request = pending_ai(&vm);
                assert_eq!(request.kind, AiOpKind::Compress);
                assert_eq!(request.max_rounds, 1);
                rounds += 1;
                let summary = format!("summary after round {}", rounds);
                vm.resume_with_ai_response(AiResponse::text(summary)).unwrap();
            }
            RunStatus::Completed => break,
            other => panic!("unexpected status {:?}", other),
        }
    }

    assert_eq!(rounds, 2);
    let summaries: Vec<&FrameEntry> = vm.frames[0]
        .entries
        .iter()
        .filter(|e| matches!(e, FrameEntry::Summary { .. }))
        .collect();
    assert_eq!(summaries.len(), 1, "exactly one rolling summary remains");
    match summaries[0] {
        FrameEntry::Summary { text } => assert_eq!(text, "summary after round 2"),
        _ => unreachable!(),
    }
    // No raw per-iteration entries from the block survive
    assert!(!vm.frames[0].entries.iter().any(
        |e| matches!(e, FrameEntry::Variable { name, .. } if name == "partial")
    ));
    assert_eq!(vm.get_value("partial"), None);

    // The second round's prompt folds the first summary in
    assert!(vm.interactions()[1].prompt.contains("summary after round 1"));
}

#[test]
fn second_compress_iteration_sees_the_rolling_summary_not_raw_entries() {
    let mut vm = build_vm(
        r#"[
            {"t": "Declare", "var_kind": "Let", "name": "i", "init": {"t": "LitNum", "v": 0}},
            {"t": "While", "test": {"t": "Binary", "op": "Lt",
                "left": {"t": "Ident", "name": "i"}, "right": {"t": "LitNum", "v": 2}},
             "body": {"t": "Block", "mode": "compress", "body": [
                {"t": "Assign", "var": "i", "value": {"t": "Binary", "op": "Add",
                 "left": {"t": "Ident", "name": "i"}, "right": {"t": "LitNum", "v": 1}}},
                {"t": "Declare", "var_kind": "Let", "name": "scratch",
                 "init": {"t": "Ident", "name": "i"}}
             ]}}
        ]"#,
    );

    run_until_pause(&mut vm);
    vm.resume_with_ai_response(AiResponse::text("iteration one summarized"))
        .unwrap();
    run_until_pause(&mut vm);

    // Paused at the second iteration's exit: its prompt carries the
    // previous summary, not iteration one's raw declaration
    let prompt = &pending_ai(&vm).prompt;
    assert!(prompt.contains("iteration one summarized"));
    assert!(prompt.contains("let scratch = 2"));
    assert!(!prompt.contains("let scratch = 1"));
}
