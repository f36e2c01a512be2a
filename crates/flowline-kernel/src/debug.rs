//! Breakpoint and pause control.
//!
//! Breakpoints address `(block, source line)`. The interpreter consults
//! [`DebugController::should_pause`] before executing each instruction;
//! instructions inside a false branch are skipped over wholesale and never
//! reach that check, so breakpoints in dead branches cannot fire.
//!
//! Pausing consumes no virtual time. `continue` and `step` are only valid
//! while paused; `step` arms a one-shot flag that pauses again at the next
//! executed instruction regardless of breakpoints.

use crate::types::BlockId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Snapshot of the debugger, included in step results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub paused: bool,
    pub current_block: Option<BlockId>,
    pub current_line: Option<usize>,
    pub step_mode: bool,
    pub breakpoints: IndexMap<BlockId, BTreeSet<usize>>,
}

#[derive(Debug, Clone, Default)]
pub struct DebugController {
    breakpoints: IndexMap<BlockId, BTreeSet<usize>>,
    paused: bool,
    current: Option<(BlockId, usize)>,
    step_mode: bool,
}

impl DebugController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_breakpoint(&mut self, block: &BlockId, line: usize) {
        debug!(%block, line, "breakpoint set");
        self.breakpoints.entry(block.clone()).or_default().insert(line);
    }

    pub fn clear_breakpoint(&mut self, block: &BlockId, line: usize) {
        if let Some(lines) = self.breakpoints.get_mut(block) {
            lines.remove(&line);
            if lines.is_empty() {
                self.breakpoints.shift_remove(block);
            }
        }
    }

    pub fn clear_all_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Should execution pause before the instruction at `(block, line)`?
    pub fn should_pause(&self, block: &BlockId, line: usize) -> bool {
        if self.paused {
            return false;
        }
        if self.step_mode {
            return true;
        }
        self.breakpoints
            .get(block)
            .is_some_and(|lines| lines.contains(&line))
    }

    /// Enter the paused state at `(block, line)`. Clears the one-shot step
    /// flag, so each `step` advances exactly one instruction.
    pub fn pause(&mut self, block: &BlockId, line: usize) {
        debug!(%block, line, "execution paused");
        self.paused = true;
        self.step_mode = false;
        self.current = Some((block.clone(), line));
    }

    /// Release the pause and run freely. Returns the released block, or
    /// `None` when not paused.
    pub fn resume_continue(&mut self) -> Option<BlockId> {
        let (block, _) = self.current.take()?;
        self.paused = false;
        debug!(%block, "continue");
        Some(block)
    }

    /// Release the pause for exactly one instruction.
    pub fn resume_step(&mut self) -> Option<BlockId> {
        let (block, _) = self.current.take()?;
        self.paused = false;
        self.step_mode = true;
        debug!(%block, "single step");
        Some(block)
    }

    /// Clear pause state but keep breakpoints. Reset semantics.
    pub fn reset(&mut self) {
        self.paused = false;
        self.current = None;
        self.step_mode = false;
    }

    pub fn info(&self) -> DebugInfo {
        DebugInfo {
            paused: self.paused,
            current_block: self.current.as_ref().map(|(b, _)| b.clone()),
            current_line: self.current.as_ref().map(|(_, l)| *l),
            step_mode: self.step_mode,
            breakpoints: self.breakpoints.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoint_matches_exact_line() {
        let mut dbg = DebugController::new();
        dbg.set_breakpoint(&"b".into(), 3);
        assert!(dbg.should_pause(&"b".into(), 3));
        assert!(!dbg.should_pause(&"b".into(), 2));
        assert!(!dbg.should_pause(&"other".into(), 3));
    }

    #[test]
    fn set_is_idempotent_clear_removes() {
        let mut dbg = DebugController::new();
        dbg.set_breakpoint(&"b".into(), 3);
        dbg.set_breakpoint(&"b".into(), 3);
        assert_eq!(dbg.info().breakpoints[&BlockId::from("b")].len(), 1);
        dbg.clear_breakpoint(&"b".into(), 3);
        assert!(dbg.info().breakpoints.is_empty());
    }

    #[test]
    fn resume_requires_pause() {
        let mut dbg = DebugController::new();
        assert!(dbg.resume_continue().is_none());
        assert!(dbg.resume_step().is_none());

        dbg.pause(&"b".into(), 1);
        assert!(dbg.is_paused());
        assert_eq!(dbg.resume_continue(), Some("b".into()));
        assert!(!dbg.is_paused());
    }

    #[test]
    fn step_arms_one_shot_pause() {
        let mut dbg = DebugController::new();
        dbg.pause(&"b".into(), 1);
        dbg.resume_step();
        // Next instruction pauses wherever it is.
        assert!(dbg.should_pause(&"b".into(), 99));
        dbg.pause(&"b".into(), 2);
        // Pausing consumed the one-shot flag.
        assert!(!dbg.info().step_mode);
    }

    #[test]
    fn no_nested_pause_while_paused() {
        let mut dbg = DebugController::new();
        dbg.set_breakpoint(&"b".into(), 1);
        dbg.pause(&"b".into(), 1);
        assert!(!dbg.should_pause(&"b".into(), 1));
    }

    #[test]
    fn reset_keeps_breakpoints() {
        let mut dbg = DebugController::new();
        dbg.set_breakpoint(&"b".into(), 5);
        dbg.pause(&"b".into(), 5);
        dbg.reset();
        assert!(!dbg.is_paused());
        assert!(dbg.should_pause(&"b".into(), 5));
    }
}
