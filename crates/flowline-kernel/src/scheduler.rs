//! Virtual-time event queue.
//!
//! Events order by `(time, seq)`: earliest time first, and insertion order
//! among events at the same instant. `seq` comes from a monotone counter
//! that never resets within a setup, which makes pop order a pure function
//! of push order. Determinism rests on this.

use crate::types::{BlockId, SimTime};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Why a block is being resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// Begin the script from the top.
    Start,
    /// Begin the script because another block ran `execute`. Unlike
    /// `Start`, this does not require the block to hold work of its own.
    Triggered,
    /// A `delay` (or `go` pre-move delay) elapsed.
    DelayElapsed,
    /// A `wait` registration fired; the condition is re-checked on resume.
    WaitSatisfied,
    /// Debugger released a paused block.
    DebugResume,
}

/// A scheduled resumption of one block.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    pub time: SimTime,
    pub seq: u64,
    pub block: BlockId,
    pub reason: WakeReason,
}

impl Eq for PendingEvent {}

impl Ord for PendingEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert for min-first pop.
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PendingEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-first queue of pending events.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    heap: BinaryHeap<PendingEvent>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: SimTime, block: BlockId, reason: WakeReason) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(PendingEvent {
            time,
            seq,
            block,
            reason,
        });
    }

    pub fn pop(&mut self) -> Option<PendingEvent> {
        self.heap.pop()
    }

    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|e| e.time)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}
