//! Context assembly
//!
//! Projects live call frames into the prompt text an AI request carries.
//! The output format (frame headers, `(current scope)` / `(entry)` /
//! `(depth N)` labels, indentation by depth) is a stable contract: any
//! change alters what the model sees and is a behavioral change.
//!
//! Declarations annotated `model` or `prompt` are configuration, not data,
//! and are always filtered out.

use crate::executor::types::{Frame, FrameEntry};
use crate::executor::Vm;

/// Fixed system prompt for the compress-block summarization round
pub const COMPRESS_PROMPT: &str = "Summarize the following execution history into one short \
paragraph. Keep every fact needed to continue the work; drop step-by-step noise.";

/// Render all frames, outermost first, entries in execution order
pub fn build_global_context(vm: &Vm) -> String {
    let mut out = String::new();
    let innermost = vm.frames.len() - 1;
    for (depth, frame) in vm.frames.iter().enumerate() {
        render_frame(&mut out, frame, depth, depth == innermost);
    }
    out
}

/// Render only the innermost frame
pub fn build_local_context(vm: &Vm) -> String {
    let mut out = String::new();
    let depth = vm.frames.len() - 1;
    render_frame(&mut out, &vm.frames[depth], depth, true);
    out
}

/// Render the entries the innermost open block has accumulated, prefixed
/// with the fixed summarization prompt
///
/// Returns `None` when the block accumulated nothing renderable, so the
/// engine can skip the round-trip entirely.
pub fn build_compress_prompt(vm: &Vm) -> Option<String> {
    let frame = vm.current_frame();
    let mark = frame.blocks.last()?;
    let mut body = String::new();
    for entry in &frame.entries[mark.entry_mark..] {
        if let Some(line) = render_entry(frame, entry, "") {
            body.push_str(&line);
            body.push('\n');
        }
    }
    if body.is_empty() {
        return None;
    }
    Some(format!("{}\n\n{}", COMPRESS_PROMPT, body))
}

/* ===================== Rendering ===================== */

fn render_frame(out: &mut String, frame: &Frame, depth: usize, current: bool) {
    let indent = "  ".repeat(depth);
    out.push_str(&indent);
    out.push_str(&format!("=== {} (depth {})", frame.name, depth));
    if current {
        out.push_str(" (current scope)");
    }
    out.push_str(" ===\n");

    let entry_indent = format!("{}  ", indent);
    for entry in &frame.entries {
        if let Some(line) = render_entry(frame, entry, &entry_indent) {
            out.push_str(&line);
            out.push('\n');
        }
    }
}

/// Render one entry, or `None` when it is filtered or unrenderable
fn render_entry(frame: &Frame, entry: &FrameEntry, indent: &str) -> Option<String> {
    match entry {
        FrameEntry::Variable {
            name,
            annotation,
            value,
        } => {
            if annotation.map(|a| a.is_config()).unwrap_or(false) {
                return None;
            }
            // A live entry reads the current local; a frozen one keeps the
            // value it had when its block exited
            let val = match value {
                Some(frozen) => frozen.clone(),
                None => frame.locals.get(name)?.value.clone(),
            };
            let line = match annotation {
                Some(ann) => format!("{}let {}: {} = {}", indent, name, ann, val.display_text()),
                None => format!("{}let {} = {}", indent, name, val.display_text()),
            };
            Some(line)
        }
        FrameEntry::AiEvent {
            kind,
            prompt,
            response,
        } => Some(format!(
            "{}[{}] {} => {} (entry)",
            indent, kind, prompt, response
        )),
        FrameEntry::Summary { text } => Some(format!("{}[summary] {}", indent, text)),
    }
}
