//! Frame and scope operations
//!
//! Strict stack discipline over call frames; lexical blocks are flattened
//! into their owning frame and tracked as marks, so block exit can remove
//! exactly the bindings the block introduced, however the block was exited.

use super::errors::EngineError;
use super::types::{BlockMark, ContextMode, Frame, FrameEntry, Val, Variable};
use super::vm::Vm;

impl Vm {
    /// The innermost call frame
    pub fn current_frame(&self) -> &Frame {
        self.frames.last().expect("call stack is never empty")
    }

    pub(crate) fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("call stack is never empty")
    }

    /// Declare a new binding in the current frame
    ///
    /// Fails with `DuplicateDeclaration` if the name already exists in the
    /// current frame (sibling-block reuse is fine: the earlier binding is
    /// gone by then). The binding and its entry are written together, after
    /// the check, so a failure never leaves a partial variable.
    pub fn declare(&mut self, name: &str, var: Variable) -> Result<(), EngineError> {
        let frame = self.current_frame_mut();
        if frame.locals.contains_key(name) {
            return Err(EngineError::DuplicateDeclaration(name.to_string()));
        }
        frame.entries.push(FrameEntry::Variable {
            name: name.to_string(),
            annotation: var.annotation,
            value: None,
        });
        frame.locals.insert(name.to_string(), var);
        if let Some(mark) = frame.blocks.last_mut() {
            mark.declared.push(name.to_string());
        }
        Ok(())
    }

    /// Assign to an existing binding, searching frames innermost→outermost
    ///
    /// `ConstReassignment` is enforced here, at the engine level: generated
    /// code can attempt it at runtime, so a front-end-only check is not
    /// enough.
    pub fn assign(&mut self, name: &str, value: Val) -> Result<(), EngineError> {
        for frame in self.frames.iter_mut().rev() {
            if let Some(var) = frame.locals.get_mut(name) {
                if var.is_const {
                    return Err(EngineError::ConstReassignment(name.to_string()));
                }
                var.value = value;
                return Ok(());
            }
        }
        Err(EngineError::UndefinedVariable(name.to_string()))
    }

    /// Read a binding, searching frames innermost→outermost, then falling
    /// back to the top-level function table
    pub fn get(&self, name: &str) -> Result<Val, EngineError> {
        for frame in self.frames.iter().rev() {
            if let Some(var) = frame.locals.get(name) {
                return Ok(var.value.clone());
            }
        }
        if self.functions.contains_key(name) {
            return Ok(Val::FuncRef(name.to_string()));
        }
        Err(EngineError::UndefinedVariable(name.to_string()))
    }

    /// Look up a binding's variable record (for const/annotation checks)
    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.locals.get(name))
    }

    /// Driver-facing inspection of a paused or completed state
    pub fn get_value(&self, name: &str) -> Option<Val> {
        self.lookup(name).map(|var| var.value.clone())
    }

    /// Open a block scope in the current frame
    pub fn enter_block(&mut self, mode: ContextMode) {
        self.enter_block_at(mode, None);
    }

    /// Open a block scope with an explicit region start
    ///
    /// Loop iterations of a compress-mode body all share the loop-start
    /// mark, so each exit folds the previous rolling summary into the next
    /// one instead of stacking summaries.
    pub fn enter_block_at(&mut self, mode: ContextMode, mark: Option<usize>) {
        let frame = self.current_frame_mut();
        let entry_mark = mark.unwrap_or(frame.entries.len());
        frame.blocks.push(BlockMark {
            entry_mark,
            declared: Vec::new(),
            mode,
        });
    }

    /// Close the innermost block scope
    ///
    /// `summary` is the compress-round output when one ran; an unwound
    /// compress block exits without paying the round-trip and just discards
    /// its entries.
    pub fn exit_block(&mut self, summary: Option<String>) {
        let frame = self.current_frame_mut();
        let Some(mark) = frame.blocks.pop() else {
            return;
        };

        match mark.mode {
            ContextMode::Verbose => {
                // Freeze final values into the entries so they stay
                // renderable after the bindings are gone
                for name in &mark.declared {
                    let frozen = frame.locals.get(name).map(|var| var.value.clone());
                    for entry in frame.entries[mark.entry_mark..].iter_mut().rev() {
                        if let FrameEntry::Variable {
                            name: entry_name,
                            value: value @ None,
                            ..
                        } = entry
                        {
                            if entry_name == name {
                                *value = frozen.clone();
                                break;
                            }
                        }
                    }
                }
            }
            ContextMode::Forget => {
                frame.entries.truncate(mark.entry_mark);
            }
            ContextMode::Compress => {
                frame.entries.truncate(mark.entry_mark);
                if let Some(text) = summary {
                    frame.entries.push(FrameEntry::Summary { text });
                }
            }
        }

        for name in &mark.declared {
            frame.locals.remove(name);
        }
    }

    /// Push a new call frame
    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Pop the innermost call frame
    pub fn pop_frame(&mut self) -> Option<Frame> {
        // The root frame stays for terminal-state inspection
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }
}
