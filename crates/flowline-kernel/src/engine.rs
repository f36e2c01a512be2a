//! Engine: setup, stepping, running, reset, and debug control.
//!
//! The engine owns every piece of simulation state and drives it through
//! the event queue. `step()` is the unit of external progress: it pops
//! events until an entity changed block membership or was processed, the
//! queue drained, or the debugger paused. All state is replaced by
//! `setup()` and restored to its post-setup shape by `reset()`.

use crate::block::Block;
use crate::config::{SimulationSetup, VariableConfig};
use crate::debug::{DebugController, DebugInfo};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::rng::RngStream;
use crate::scheduler::{EventQueue, WakeReason};
use crate::snapshot::{
    BlockSnapshot, CompletionReason, EntitySnapshot, RunResult, StepResult, VariableSnapshot,
};
use crate::store::VariableStore;
use crate::types::{BlockId, EntityId, LogEntry, SimTime, Warning, WarningKind};
use indexmap::{IndexMap, IndexSet};
use tracing::{info, instrument, warn};

/// Events processed in one `step()` before giving up. A script that keeps
/// the queue busy at one instant without moving anything trips this guard
/// instead of hanging the caller.
pub(crate) const MAX_EVENTS_PER_STEP: usize = 1000;

/// Absolute step cap for `run()`, regardless of stop condition.
const HARD_STEP_CAP: u64 = 1_000_000;

/// When to stop a `run`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopCondition {
    MaxSteps(u64),
    UntilTime(SimTime),
    UntilProcessed(u64),
}

pub struct Engine {
    pub(crate) blocks: IndexMap<BlockId, Block>,
    pub(crate) store: VariableStore,
    pub(crate) queue: EventQueue,
    pub(crate) debug: DebugController,
    pub(crate) rng: RngStream,
    pub(crate) now: SimTime,
    pub(crate) entities_processed: u64,
    pub(crate) next_entity: u64,
    pub(crate) log: Vec<LogEntry>,
    pub(crate) warnings: Vec<Warning>,
    setup_config: Option<SimulationSetup>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            blocks: IndexMap::new(),
            store: VariableStore::new(),
            queue: EventQueue::new(),
            debug: DebugController::new(),
            rng: RngStream::new(0),
            now: 0.0,
            entities_processed: 0,
            next_entity: 0,
            log: Vec::new(),
            warnings: Vec::new(),
            setup_config: None,
        }
    }

    /// Load a setup, replacing all prior state including breakpoints.
    #[instrument(skip(self, config), fields(blocks = config.blocks.len()))]
    pub fn setup(&mut self, config: SimulationSetup) -> Result<()> {
        self.apply_setup(config)
    }

    fn apply_setup(&mut self, config: SimulationSetup) -> Result<()> {
        let mut blocks: IndexMap<BlockId, Block> = IndexMap::new();
        for bc in &config.blocks {
            let id = BlockId(bc.id.clone());
            if blocks.contains_key(&id) {
                return Err(Error::DuplicateBlock(id));
            }
            let script = flowline_script::compile(&bc.script);
            let name = bc.name.clone().unwrap_or_else(|| bc.id.clone());
            let mut block = Block::new(id.clone(), name, bc.capacity, script);
            for (connector, target) in &bc.outputs {
                block
                    .outputs
                    .insert(connector.clone(), BlockId(target.clone()));
            }
            blocks.insert(id, block);
        }

        // Derive roles from the link graph.
        let inbound: IndexSet<BlockId> = blocks
            .values()
            .flat_map(|b| b.outputs.values().cloned())
            .collect();
        for (id, block) in &mut blocks {
            let has_inbound = inbound.contains(id);
            block.is_source =
                !has_inbound && !block.outputs.is_empty() && !block.script.force_execution;
            block.is_sink = has_inbound && block.outputs.is_empty();
        }

        let mut store = VariableStore::new();
        for var in &config.variables {
            let declared = match var {
                VariableConfig::Boolean { name, initial } => store.declare_bool(name, *initial),
                VariableConfig::Integer { name, initial } => store.declare_int(name, *initial),
            };
            if declared.is_err() {
                let name = match var {
                    VariableConfig::Boolean { name, .. } => name,
                    VariableConfig::Integer { name, .. } => name,
                };
                return Err(Error::VariableTypeConflict { name: name.clone() });
            }
        }

        self.blocks = blocks;
        self.store = store;
        self.queue = EventQueue::new();
        self.debug = DebugController::new();
        self.rng = RngStream::new(config.seed);
        self.now = 0.0;
        self.entities_processed = 0;
        self.next_entity = 0;
        self.log.clear();
        self.warnings.clear();

        // Surface compile warnings and dangling links without aborting.
        let setup_warnings: Vec<Warning> = self
            .blocks
            .values()
            .flat_map(|b| {
                let id = b.id.clone();
                let compile = b.script.warnings.iter().map({
                    let id = id.clone();
                    move |w| Warning {
                        time: 0.0,
                        block: id.clone(),
                        line: Some(w.line_no),
                        kind: WarningKind::UnknownCommand,
                        message: w.message.clone(),
                    }
                });
                let links: Vec<Warning> = b
                    .outputs
                    .iter()
                    .filter(|(_, target)| !self.blocks.contains_key(*target))
                    .map(|(connector, target)| Warning {
                        time: 0.0,
                        block: id.clone(),
                        line: None,
                        kind: WarningKind::UnknownTarget,
                        message: format!("connector `{connector}` points at unknown block `{target}`"),
                    })
                    .collect();
                compile.chain(links).collect::<Vec<_>>()
            })
            .collect();
        for w in &setup_warnings {
            warn!(block = %w.block, message = %w.message, "setup warning");
        }
        self.warnings = setup_warnings;

        for id in self.runnable_blocks() {
            self.queue.push(0.0, id, WakeReason::Start);
        }

        info!(
            blocks = self.blocks.len(),
            seed = config.seed,
            "setup loaded"
        );
        self.setup_config = Some(config);
        Ok(())
    }

    fn runnable_blocks(&self) -> Vec<BlockId> {
        self.blocks
            .values()
            .filter(|b| b.wants_to_run())
            .map(|b| b.id.clone())
            .collect()
    }

    /// Restore the post-setup state. Breakpoints survive.
    pub fn reset(&mut self) -> Result<()> {
        let config = self.setup_config.clone().ok_or(Error::NotSetUp)?;
        let breakpoints = self.debug.info().breakpoints;
        self.apply_setup(config)?;
        for (block, lines) in breakpoints {
            for line in lines {
                self.debug.set_breakpoint(&block, line);
            }
        }
        Ok(())
    }

    /// Advance until an entity changed block membership or was processed,
    /// the queue drained, the debugger paused, or the event guard tripped.
    /// A step never crosses into a later time instant once it has handled
    /// an event.
    #[instrument(skip(self), fields(time = self.now))]
    pub fn step(&mut self) -> Result<StepResult> {
        if self.setup_config.is_none() {
            return Err(Error::NotSetUp);
        }
        let mark = self.warnings.len();
        if self.debug.is_paused() {
            return Ok(self.make_step_result("paused; debugger holds execution".into(), mark));
        }

        let mut description = String::from("no pending events");
        let mut events = 0usize;
        loop {
            let Some(ev) = self.queue.pop() else {
                description = "event queue drained".into();
                break;
            };
            events += 1;
            if ev.time > self.now {
                self.now = ev.time;
            }

            let outcome = self.resume_block(&ev.block, ev.reason);
            if let Some(run) = outcome {
                description = run.summary;
                if run.paused || run.progressed {
                    break;
                }
            }

            // One step handles at most one time instant. Without this a
            // stretch of no-progress events would drag the clock
            // arbitrarily far in a single call.
            if self.queue.peek_time().is_some_and(|t| t > self.now) {
                break;
            }

            if events >= MAX_EVENTS_PER_STEP {
                self.warn(
                    &ev.block,
                    None,
                    WarningKind::RuntimeError,
                    format!("{MAX_EVENTS_PER_STEP} events processed without progress; giving up this step"),
                );
                description = "event guard tripped".into();
                break;
            }
        }
        Ok(self.make_step_result(description, mark))
    }

    /// Repeat `step()` until the stop condition, the queue drains, or the
    /// debugger pauses.
    pub fn run(&mut self, stop: StopCondition) -> Result<RunResult> {
        if self.setup_config.is_none() {
            return Err(Error::NotSetUp);
        }
        let log_mark = self.log.len();
        let warn_mark = self.warnings.len();
        let mut steps = 0u64;
        let mut last: Option<StepResult> = None;

        let reason = loop {
            if self.debug.is_paused() {
                break CompletionReason::Paused;
            }
            if self.queue.is_empty() {
                break CompletionReason::QueueDrained;
            }
            if let StopCondition::UntilTime(t) = stop {
                // Do not execute past the horizon.
                if self.queue.peek_time().is_some_and(|next| next > t) {
                    break CompletionReason::TimeLimitReached;
                }
            }

            last = Some(self.step()?);
            steps += 1;

            match stop {
                StopCondition::MaxSteps(n) if steps >= n => {
                    break CompletionReason::MaxStepsReached;
                }
                StopCondition::UntilProcessed(n) if self.entities_processed >= n => {
                    break CompletionReason::ProcessedTargetReached;
                }
                StopCondition::UntilTime(t) if self.now >= t => {
                    break CompletionReason::TimeLimitReached;
                }
                _ => {}
            }
            if steps >= HARD_STEP_CAP {
                break CompletionReason::MaxStepsReached;
            }
        };

        info!(steps, time = self.now, %reason, "run finished");
        let final_state = last
            .unwrap_or_else(|| self.make_step_result(format!("run stopped: {reason}"), warn_mark));
        Ok(RunResult {
            steps_executed: steps,
            final_time: self.now,
            completion_reason: reason,
            log: self.log[log_mark..].to_vec(),
            warnings: self.warnings[warn_mark..].to_vec(),
            final_state,
        })
    }

    // === Debug control ===

    pub fn set_breakpoint(&mut self, block: &BlockId, line: usize) {
        self.debug.set_breakpoint(block, line);
    }

    pub fn clear_breakpoint(&mut self, block: &BlockId, line: usize) {
        self.debug.clear_breakpoint(block, line);
    }

    pub fn clear_all_breakpoints(&mut self) {
        self.debug.clear_all_breakpoints();
    }

    pub fn debug_info(&self) -> DebugInfo {
        self.debug.info()
    }

    /// Resume a paused script and run it to its next suspension.
    /// Consumes no virtual time. Fails when not paused.
    pub fn debug_continue(&mut self) -> Result<StepResult> {
        let mark = self.warnings.len();
        let block = self.debug.resume_continue().ok_or(Error::NotPaused)?;
        let _ = self.resume_block(&block, WakeReason::DebugResume);
        Ok(self.make_step_result(format!("{block}: continued"), mark))
    }

    /// Resume a paused script for exactly one instruction, then pause
    /// again. Fails when not paused.
    pub fn debug_step(&mut self) -> Result<StepResult> {
        let mark = self.warnings.len();
        let block = self.debug.resume_step().ok_or(Error::NotPaused)?;
        let _ = self.resume_block(&block, WakeReason::DebugResume);
        Ok(self.make_step_result(format!("{block}: stepped one instruction"), mark))
    }

    // === Introspection ===

    pub fn current_time(&self) -> SimTime {
        self.now
    }

    pub fn entities_processed_total(&self) -> u64 {
        self.entities_processed
    }

    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    /// Unified listing of every variable with current and initial value.
    pub fn variables(&self) -> Vec<VariableSnapshot> {
        let bools = self.store.signals().map(|(name, value)| {
            VariableSnapshot::Boolean {
                name: name.to_string(),
                value,
                initial: self.store.initial_bool(name).unwrap_or(false),
            }
        });
        let ints = self.store.integers().map(|(name, value)| {
            VariableSnapshot::Integer {
                name: name.to_string(),
                value,
                initial: self.store.initial_int(name).unwrap_or(0),
            }
        });
        bools.chain(ints).collect()
    }

    // === Internals shared with the interpreter ===

    pub(crate) fn warn(
        &mut self,
        block: &BlockId,
        line: Option<usize>,
        kind: WarningKind,
        message: String,
    ) {
        warn!(%block, ?line, %message, "script warning");
        self.warnings.push(Warning {
            time: self.now,
            block: block.clone(),
            line,
            kind,
            message,
        });
    }

    pub(crate) fn fresh_entity(&mut self) -> Entity {
        self.next_entity += 1;
        Entity::new(EntityId(format!("entity-{}", self.next_entity)), self.now)
    }

    /// Schedule a start for a block that has a reason to run.
    pub(crate) fn schedule_if_ready(&mut self, id: &BlockId, at: SimTime) {
        if self.blocks.get(id).is_some_and(|b| b.wants_to_run()) {
            self.queue.push(at, id.clone(), WakeReason::Start);
        }
    }

    fn make_step_result(&self, description: String, warn_mark: usize) -> StepResult {
        let active_entities: Vec<EntitySnapshot> = self
            .blocks
            .values()
            .flat_map(|b| {
                b.entities.iter().map(|e| EntitySnapshot {
                    id: e.id.clone(),
                    block: b.id.clone(),
                    state: e.state,
                    color: e.color,
                    attributes: e.attributes.clone(),
                    created_at: e.created_at,
                })
            })
            .collect();
        let blocks: Vec<BlockSnapshot> = self
            .blocks
            .values()
            .map(|b| BlockSnapshot {
                id: b.id.clone(),
                name: b.name.clone(),
                entity_count: b.entities.len(),
                capacity: b.capacity,
                status: b.status.clone(),
                total_processed: b.total_processed,
            })
            .collect();
        StepResult {
            time: self.now,
            event_description: description,
            entities_processed_total: self.entities_processed,
            active_entities,
            signals: self.store.signals().map(|(k, v)| (k.to_string(), v)).collect(),
            integers: self.store.integers().map(|(k, v)| (k.to_string(), v)).collect(),
            blocks,
            warnings: self.warnings[warn_mark..].to_vec(),
            debug: self.debug.info(),
        }
    }
}
