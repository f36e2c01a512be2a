//! Core identifier and record types shared across the kernel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Virtual time, in abstract units. Starts at 0.0 and only moves forward.
pub type SimTime = f64;

/// Identifier of a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub String);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BlockId {
    fn from(s: &str) -> Self {
        BlockId(s.to_string())
    }
}

/// Identifier of an entity. Unique for the lifetime of a setup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

/// Category of a recorded warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Script line did not parse; it runs as a no-op.
    UnknownCommand,
    /// `jump to` a line that holds no instruction.
    BadJumpTarget,
    /// Transport refused because the target block is full.
    CapacityRejected,
    /// Transport refused because the connector or target does not exist.
    UnknownTarget,
    /// Instruction failed at run time (bad index, type mismatch, ...).
    RuntimeError,
}

/// A recorded warning. Warnings never abort the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub time: SimTime,
    pub block: BlockId,
    /// Source line of the offending instruction, when one applies.
    pub line: Option<usize>,
    pub kind: WarningKind,
    pub message: String,
}

/// One `log` instruction's output, after interpolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: SimTime,
    pub block: BlockId,
    pub message: String,
}
