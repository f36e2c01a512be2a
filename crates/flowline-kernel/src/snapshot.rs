//! Serializable views of simulation state, returned by `step` and `run`.

use crate::debug::DebugInfo;
use crate::entity::{EntityColor, EntityState};
use crate::types::{BlockId, EntityId, LogEntry, SimTime, Warning};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub block: BlockId,
    pub state: EntityState,
    pub color: EntityColor,
    pub attributes: Vec<String>,
    pub created_at: SimTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub id: BlockId,
    pub name: String,
    pub entity_count: usize,
    pub capacity: Option<usize>,
    pub status: Option<String>,
    pub total_processed: u64,
}

/// Unified variable listing entry, current plus initial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VariableSnapshot {
    Boolean {
        name: String,
        value: bool,
        initial: bool,
    },
    Integer {
        name: String,
        value: i64,
        initial: i64,
    },
}

/// State after one `step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub time: SimTime,
    /// Human-readable summary of what the step did.
    pub event_description: String,
    pub entities_processed_total: u64,
    pub active_entities: Vec<EntitySnapshot>,
    pub signals: IndexMap<String, bool>,
    pub integers: IndexMap<String, i64>,
    pub blocks: Vec<BlockSnapshot>,
    /// Warnings recorded during this step only.
    pub warnings: Vec<Warning>,
    pub debug: DebugInfo,
}

/// Why a `run` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    QueueDrained,
    MaxStepsReached,
    TimeLimitReached,
    ProcessedTargetReached,
    Paused,
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompletionReason::QueueDrained => "event queue drained",
            CompletionReason::MaxStepsReached => "step limit reached",
            CompletionReason::TimeLimitReached => "time limit reached",
            CompletionReason::ProcessedTargetReached => "processed-entity target reached",
            CompletionReason::Paused => "paused at breakpoint",
        };
        f.write_str(s)
    }
}

/// State after a `run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub steps_executed: u64,
    pub final_time: SimTime,
    pub completion_reason: CompletionReason,
    /// All `log` output of the run, in order.
    pub log: Vec<LogEntry>,
    /// All warnings of the run, in order.
    pub warnings: Vec<Warning>,
    pub final_state: StepResult,
}
