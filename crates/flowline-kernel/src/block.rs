//! Blocks: the stations of a process flow.
//!
//! A block holds entities (bounded by optional capacity), owns one compiled
//! script, and carries the script's resumable execution state. At most one
//! script execution per block is in flight at any time.

use crate::entity::Entity;
use crate::types::{BlockId, EntityId, SimTime, Warning};
use flowline_script::CompiledScript;
use indexmap::IndexMap;
use std::sync::Arc;

/// One frame of the conditional-chain stack: a chain lives at one indent,
/// and `taken` records whether any branch of it has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfFrame {
    pub indent: usize,
    pub taken: bool,
}

/// What a suspended script is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    /// A scheduled delay event will resume it.
    Delay,
    /// Store wait registrations will resume it.
    Wait,
    /// The debugger holds it; `continue`/`step` resumes it.
    Breakpoint,
}

/// Resumable execution state of a block's script.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecState {
    Idle,
    Suspended {
        /// Index of the next instruction to execute.
        cursor: usize,
        if_stack: Vec<IfFrame>,
        reason: SuspendReason,
    },
}

impl ExecState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ExecState::Idle)
    }
}

/// A routed hand-off whose pre-move delay is still pending.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMove {
    pub connector: String,
    pub target: String,
    pub entity: EntityId,
    /// Source line of the `go`, for warnings on failure.
    pub line_no: usize,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    /// `None` means unlimited.
    pub capacity: Option<usize>,
    pub script: Arc<CompiledScript>,
    /// Connector name to target block.
    pub outputs: IndexMap<String, BlockId>,
    pub entities: Vec<Entity>,
    /// Display status, set by `<block>.status = "..."`.
    pub status: Option<String>,
    pub warnings: Vec<Warning>,
    pub total_processed: u64,
    pub exec: ExecState,
    pub pending_move: Option<PendingMove>,
    /// Entity the current script run is handling, if any.
    pub active_entity: Option<EntityId>,
    /// Whether the current run has suspended at least once. Runs that
    /// complete without suspending restart with a backoff so an
    /// instantaneous script cannot pin the queue at one instant.
    pub run_suspended: bool,
    /// No inbound links: auto-spawns one entity at script start when empty.
    pub is_source: bool,
    /// No outbound links: auto-disposes the entity when its script completes.
    pub is_sink: bool,
    /// Last time a capacity warning was recorded per rejected entity.
    /// Throttles repeated rejections to one warning per time unit.
    pub last_capacity_warn: IndexMap<EntityId, SimTime>,
}

impl Block {
    pub fn new(id: BlockId, name: String, capacity: Option<usize>, script: CompiledScript) -> Self {
        Block {
            id,
            name,
            capacity,
            script: Arc::new(script),
            outputs: IndexMap::new(),
            entities: Vec::new(),
            status: None,
            warnings: Vec::new(),
            total_processed: 0,
            exec: ExecState::Idle,
            pending_move: None,
            active_entity: None,
            run_suspended: false,
            is_source: false,
            is_sink: false,
            last_capacity_warn: IndexMap::new(),
        }
    }

    pub fn can_accept(&self) -> bool {
        match self.capacity {
            Some(cap) => self.entities.len() < cap,
            None => true,
        }
    }

    pub fn add_entity(&mut self, entity: Entity) -> bool {
        if !self.can_accept() {
            return false;
        }
        self.entities.push(entity);
        true
    }

    pub fn remove_entity(&mut self, id: &EntityId) -> Option<Entity> {
        let pos = self.entities.iter().position(|e| &e.id == id)?;
        Some(self.entities.remove(pos))
    }

    /// The entity a fresh script run would handle: the oldest held entity
    /// this block has not yet processed.
    pub fn next_unprocessed(&self) -> Option<&Entity> {
        self.entities.iter().find(|e| !e.processed_by.contains(&self.id))
    }

    /// The entity script instructions act on: the run's active entity, or
    /// the oldest held entity when none was bound.
    pub fn current_entity(&self) -> Option<&Entity> {
        match &self.active_entity {
            Some(id) => self.entities.iter().find(|e| &e.id == id),
            None => self.entities.first(),
        }
    }

    pub fn current_entity_mut(&mut self) -> Option<&mut Entity> {
        match self.active_entity.clone() {
            Some(id) => self.entities.iter_mut().find(|e| e.id == id),
            None => self.entities.first_mut(),
        }
    }

    /// True when an idle block has a reason to start its script.
    pub fn wants_to_run(&self) -> bool {
        if !self.exec.is_idle() {
            return false;
        }
        if self.script.is_empty() {
            // An empty-script sink still runs (a zero-length run) so it
            // consumes arrivals.
            return self.is_sink && self.next_unprocessed().is_some();
        }
        self.script.force_execution || self.is_source || self.next_unprocessed().is_some()
    }
}
