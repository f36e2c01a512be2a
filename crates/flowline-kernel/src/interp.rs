//! Script interpreter.
//!
//! Suspension is explicit: when a script hits `delay`, an unsatisfied
//! `wait`, or a breakpoint, its cursor and conditional stack are written
//! back into the block and control returns to the engine. Resumption picks
//! up from that stored state; a `wait` keeps its cursor on the wait line so
//! the condition is re-checked on every wake.
//!
//! Runtime problems never abort a run. A failing instruction records a
//! warning and execution continues at the next line.

use crate::block::{ExecState, IfFrame, PendingMove, SuspendReason};
use crate::engine::Engine;
use crate::entity::{EntityColor, EntityState};
use crate::scheduler::WakeReason;
use crate::store::AccessError;
use crate::types::{BlockId, EntityId, LogEntry, WarningKind};
use flowline_script::{
    BranchKind, CompiledLine, Condition, ConditionExpr, Connective, DelaySpec, Instruction,
    Operand,
};
use tracing::{info, trace};

/// Instructions one resumption may execute before the run is aborted. A
/// jump loop with no `delay` or `wait` would otherwise never yield.
const MAX_INSTRUCTIONS_PER_RUN: usize = 10_000;

/// Outcome of resuming one block.
pub(crate) struct ResumeRun {
    /// An entity changed block membership or was processed.
    pub progressed: bool,
    /// Execution stopped at a breakpoint or single step.
    pub paused: bool,
    pub summary: String,
}

impl Engine {
    /// Resume a block for the given reason. Returns `None` when the event
    /// is stale: the block's stored state no longer expects this wake.
    pub(crate) fn resume_block(&mut self, id: &BlockId, reason: WakeReason) -> Option<ResumeRun> {
        let (mut cursor, mut if_stack, mut skip_check) = {
            let block = self.blocks.get(id)?;
            match (&block.exec, reason) {
                (ExecState::Idle, WakeReason::Start) => {
                    if !block.wants_to_run() {
                        return None;
                    }
                    (0, Vec::new(), false)
                }
                (ExecState::Idle, WakeReason::Triggered) => {
                    if block.script.is_empty() {
                        return None;
                    }
                    (0, Vec::new(), false)
                }
                (
                    ExecState::Suspended {
                        cursor,
                        if_stack,
                        reason: SuspendReason::Delay,
                    },
                    WakeReason::DelayElapsed,
                ) => (*cursor, if_stack.clone(), false),
                (
                    ExecState::Suspended {
                        cursor,
                        if_stack,
                        reason: SuspendReason::Wait,
                    },
                    WakeReason::WaitSatisfied,
                ) => (*cursor, if_stack.clone(), false),
                (
                    ExecState::Suspended {
                        cursor,
                        if_stack,
                        reason: SuspendReason::Breakpoint,
                    },
                    WakeReason::DebugResume,
                ) => (*cursor, if_stack.clone(), true),
                _ => {
                    trace!(block = %id, ?reason, "stale wake dropped");
                    return None;
                }
            }
        };

        let mut progressed = false;
        let mut summary = match reason {
            WakeReason::Start => format!("{id}: script started"),
            WakeReason::Triggered => format!("{id}: script triggered"),
            WakeReason::DelayElapsed => format!("{id}: delay elapsed"),
            WakeReason::WaitSatisfied => format!("{id}: wait satisfied"),
            WakeReason::DebugResume => format!("{id}: resumed by debugger"),
        };

        if matches!(reason, WakeReason::Start | WakeReason::Triggered) {
            let spawn = {
                let block = self.blocks.get(id)?;
                reason == WakeReason::Start && block.is_source && block.entities.is_empty()
            };
            if spawn {
                let entity = self.fresh_entity();
                summary = format!("{id}: spawned {}", entity.id);
                progressed = true;
                self.blocks.get_mut(id)?.entities.push(entity);
            }
            let block = self.blocks.get_mut(id)?;
            block.active_entity = block.next_unprocessed().map(|e| e.id.clone());
            block.run_suspended = false;
            block.exec = ExecState::Idle;
        } else {
            self.blocks.get_mut(id)?.exec = ExecState::Idle;
        }

        // A pre-move delay elapsed: deliver the stashed hand-off first.
        if reason == WakeReason::DelayElapsed {
            if let Some(pm) = self.blocks.get_mut(id)?.pending_move.take() {
                let PendingMove {
                    connector,
                    target,
                    entity,
                    line_no,
                } = pm;
                if self.transfer(id, &connector, &target, &entity, line_no) {
                    progressed = true;
                    summary = format!("{entity}: {id} -> {target}");
                }
            }
        }

        let script = self.blocks.get(id)?.script.clone();
        let mut executed = 0usize;
        loop {
            if cursor >= script.lines.len() {
                self.finish_run(id, &mut progressed, &mut summary);
                break;
            }
            executed += 1;
            if executed > MAX_INSTRUCTIONS_PER_RUN {
                self.warn(
                    id,
                    Some(script.lines[cursor].line_no),
                    WarningKind::RuntimeError,
                    format!(
                        "{MAX_INSTRUCTIONS_PER_RUN} instructions without yielding; run aborted"
                    ),
                );
                let block = self.blocks.get_mut(id)?;
                block.exec = ExecState::Idle;
                block.active_entity = None;
                summary = format!("{id}: runaway script aborted");
                break;
            }
            let line = &script.lines[cursor];

            if !skip_check && self.debug.should_pause(id, line.line_no) {
                self.debug.pause(id, line.line_no);
                let block = self.blocks.get_mut(id)?;
                block.run_suspended = true;
                block.exec = ExecState::Suspended {
                    cursor,
                    if_stack,
                    reason: SuspendReason::Breakpoint,
                };
                return Some(ResumeRun {
                    progressed,
                    paused: true,
                    summary: format!("{id}: paused at line {}", line.line_no),
                });
            }
            skip_check = false;

            pop_left_frames(&mut if_stack, line);

            match &line.instr {
                Instruction::Delay { spec } => {
                    let dur = self.sample_delay(*spec);
                    trace!(block = %id, dur, "delay");
                    self.queue
                        .push(self.now + dur, id.clone(), WakeReason::DelayElapsed);
                    let block = self.blocks.get_mut(id)?;
                    block.run_suspended = true;
                    block.exec = ExecState::Suspended {
                        cursor: cursor + 1,
                        if_stack,
                        reason: SuspendReason::Delay,
                    };
                    return Some(ResumeRun {
                        progressed,
                        paused: false,
                        summary,
                    });
                }

                Instruction::SignalSet { name, value } => {
                    match self.store.set_bool(name, *value) {
                        Ok(woken) => self.schedule_woken(woken),
                        Err(e) => self.warn(
                            id,
                            Some(line.line_no),
                            WarningKind::RuntimeError,
                            e.to_string(),
                        ),
                    }
                    cursor += 1;
                }

                Instruction::IntAssign { name, op, operand } => {
                    match self.resolve_operand(operand) {
                        Ok(rhs) => match self.store.apply_int(name, *op, rhs) {
                            Ok((_, woken)) => self.schedule_woken(woken),
                            Err(e) => self.warn(
                                id,
                                Some(line.line_no),
                                WarningKind::RuntimeError,
                                e.to_string(),
                            ),
                        },
                        Err(e) => self.warn(
                            id,
                            Some(line.line_no),
                            WarningKind::RuntimeError,
                            e.to_string(),
                        ),
                    }
                    cursor += 1;
                }

                Instruction::Wait { cond } => match self.eval_cond(id, cond) {
                    Ok(true) => cursor += 1,
                    Ok(false) => {
                        let registrable = cond.signal_atoms().next().is_some()
                            || cond.int_atoms().next().is_some();
                        if !registrable {
                            self.warn(
                                id,
                                Some(line.line_no),
                                WarningKind::RuntimeError,
                                "wait condition has no signal or variable to wake on".into(),
                            );
                            cursor += 1;
                        } else {
                            for (name, expected) in cond.signal_atoms() {
                                self.store.register_bool_wait(id, name, expected);
                            }
                            for name in cond.int_atoms() {
                                self.store.register_int_wait(id, name);
                            }
                            trace!(block = %id, line = line.line_no, "waiting");
                            let block = self.blocks.get_mut(id)?;
                            block.run_suspended = true;
                            // Cursor stays on the wait: re-check on wake.
                            block.exec = ExecState::Suspended {
                                cursor,
                                if_stack,
                                reason: SuspendReason::Wait,
                            };
                            return Some(ResumeRun {
                                progressed,
                                paused: false,
                                summary,
                            });
                        }
                    }
                    Err(e) => {
                        self.warn(
                            id,
                            Some(line.line_no),
                            WarningKind::RuntimeError,
                            format!("wait skipped: {e}"),
                        );
                        cursor += 1;
                    }
                },

                Instruction::Branch {
                    kind,
                    cond,
                    skip_to,
                } => {
                    cursor = self.exec_branch(id, line, *kind, cond, *skip_to, cursor, &mut if_stack);
                }

                Instruction::Jump { line: target_line, target } => match target {
                    Some(t) => cursor = *t,
                    None => {
                        self.warn(
                            id,
                            Some(line.line_no),
                            WarningKind::BadJumpTarget,
                            format!("jump to line {target_line} ignored"),
                        );
                        cursor += 1;
                    }
                },

                Instruction::Go {
                    connector,
                    target,
                    entity_index,
                    delay,
                } => {
                    let entity_id = self
                        .blocks
                        .get(id)?
                        .entities
                        .get(*entity_index)
                        .map(|e| e.id.clone());
                    let Some(entity_id) = entity_id else {
                        self.warn(
                            id,
                            Some(line.line_no),
                            WarningKind::RuntimeError,
                            format!("no entity at index {entity_index}"),
                        );
                        cursor += 1;
                        continue;
                    };
                    match delay {
                        Some(spec) => {
                            // Hand-off with travel time: the entity rides in
                            // transit, still counted against this block.
                            let dur = self.sample_delay(*spec);
                            let block = self.blocks.get_mut(id)?;
                            if let Some(e) =
                                block.entities.iter_mut().find(|e| e.id == entity_id)
                            {
                                e.state = EntityState::Transit;
                            }
                            block.pending_move = Some(PendingMove {
                                connector: connector.clone(),
                                target: target.clone(),
                                entity: entity_id,
                                line_no: line.line_no,
                            });
                            block.run_suspended = true;
                            block.exec = ExecState::Suspended {
                                cursor: cursor + 1,
                                if_stack,
                                reason: SuspendReason::Delay,
                            };
                            self.queue.push(
                                self.now + dur,
                                id.clone(),
                                WakeReason::DelayElapsed,
                            );
                            return Some(ResumeRun {
                                progressed,
                                paused: false,
                                summary,
                            });
                        }
                        None => {
                            if self.transfer(id, connector, target, &entity_id, line.line_no) {
                                progressed = true;
                                summary = format!("{entity_id}: {id} -> {target}");
                            }
                            cursor += 1;
                        }
                    }
                }

                Instruction::AttrAdd { attrs, color } => {
                    self.attr_add(id, line.line_no, attrs, color.as_deref());
                    cursor += 1;
                }

                Instruction::AttrRemove { attrs } => {
                    let block = self.blocks.get_mut(id)?;
                    match block.current_entity_mut() {
                        Some(e) => e.attributes.retain(|a| !attrs.contains(a)),
                        None => self.warn(
                            id,
                            Some(line.line_no),
                            WarningKind::RuntimeError,
                            "no entity to remove attributes from".into(),
                        ),
                    }
                    cursor += 1;
                }

                Instruction::AttrSet { index, value } => {
                    self.attr_set(id, line.line_no, *index, value);
                    cursor += 1;
                }

                Instruction::Log { template } => {
                    let message = self.interpolate(id, template);
                    info!(target: "flowline::script", block = %id, %message);
                    self.log.push(LogEntry {
                        time: self.now,
                        block: id.clone(),
                        message,
                    });
                    cursor += 1;
                }

                Instruction::CreateProduct => {
                    if self.blocks.get(id)?.can_accept() {
                        let entity = self.fresh_entity();
                        summary = format!("{id}: created {}", entity.id);
                        progressed = true;
                        self.blocks.get_mut(id)?.entities.push(entity);
                    } else {
                        self.warn(
                            id,
                            Some(line.line_no),
                            WarningKind::CapacityRejected,
                            "create product refused; block is full".into(),
                        );
                    }
                    cursor += 1;
                }

                Instruction::DisposeProduct => {
                    let removed = {
                        let block = self.blocks.get_mut(id)?;
                        let victim = block
                            .active_entity
                            .clone()
                            .and_then(|eid| block.remove_entity(&eid))
                            .or_else(|| {
                                (!block.entities.is_empty()).then(|| block.entities.remove(0))
                            });
                        if let Some(e) = &victim {
                            block.total_processed += 1;
                            if block.active_entity.as_ref() == Some(&e.id) {
                                block.active_entity = None;
                            }
                        }
                        victim
                    };
                    match removed {
                        Some(e) => {
                            self.entities_processed += 1;
                            progressed = true;
                            summary = format!("{}: disposed at {id}", e.id);
                            info!(entity = %e.id, block = %id, "entity disposed");
                        }
                        None => self.warn(
                            id,
                            Some(line.line_no),
                            WarningKind::RuntimeError,
                            "dispose product with no entity".into(),
                        ),
                    }
                    cursor += 1;
                }

                Instruction::Execute { block } => {
                    let target = BlockId(block.clone());
                    if self.blocks.contains_key(&target) {
                        self.queue
                            .push(self.now, target, WakeReason::Triggered);
                    } else {
                        self.warn(
                            id,
                            Some(line.line_no),
                            WarningKind::UnknownTarget,
                            format!("execute target `{block}` does not exist"),
                        );
                    }
                    cursor += 1;
                }

                Instruction::BlockStatus { block, status } => {
                    let target = BlockId(block.clone());
                    match self.blocks.get_mut(&target) {
                        Some(b) => b.status = Some(status.clone()),
                        None => self.warn(
                            id,
                            Some(line.line_no),
                            WarningKind::UnknownTarget,
                            format!("status target `{block}` does not exist"),
                        ),
                    }
                    cursor += 1;
                }

                Instruction::Unknown { line: text } => {
                    trace!(block = %id, text, "unknown line skipped");
                    cursor += 1;
                }
            }
        }

        Some(ResumeRun {
            progressed,
            paused: false,
            summary,
        })
    }

    /// Script ran off its end: mark the handled entity processed, let sinks
    /// consume it, go idle, and re-arm if there is more to do.
    fn finish_run(&mut self, id: &BlockId, progressed: &mut bool, summary: &mut String) {
        let (disposed, suspended) = {
            let Some(block) = self.blocks.get_mut(id) else {
                return;
            };
            let mut disposed: Option<EntityId> = None;
            if let Some(eid) = block.active_entity.take() {
                if block.entities.iter().any(|e| e.id == eid) {
                    if let Some(e) = block.entities.iter_mut().find(|e| e.id == eid) {
                        e.processed_by.insert(id.clone());
                    }
                    *progressed = true;
                    if block.is_sink {
                        block.remove_entity(&eid);
                        block.total_processed += 1;
                        disposed = Some(eid);
                    }
                }
            }
            block.exec = ExecState::Idle;
            block.pending_move = None;
            (disposed, block.run_suspended)
        };
        if let Some(eid) = disposed {
            self.entities_processed += 1;
            *summary = format!("{eid}: consumed at {id}");
            info!(entity = %eid, block = %id, "entity consumed at sink");
        }
        // Instantaneous runs back off one time unit before re-arming.
        let at = if suspended { self.now } else { self.now + 1.0 };
        self.schedule_if_ready(id, at);
    }

    fn exec_branch(
        &mut self,
        id: &BlockId,
        line: &CompiledLine,
        kind: BranchKind,
        cond: &Option<ConditionExpr>,
        skip_to: usize,
        cursor: usize,
        if_stack: &mut Vec<IfFrame>,
    ) -> usize {
        match kind {
            BranchKind::If => {
                let met = match cond {
                    Some(c) => self.eval_cond_or_warn(id, line.line_no, c),
                    None => false,
                };
                if_stack.push(IfFrame {
                    indent: line.indent,
                    taken: met,
                });
                if met {
                    cursor + 1
                } else {
                    skip_to
                }
            }
            BranchKind::Elif => {
                let chain_open = match if_stack.last() {
                    Some(f) if f.indent == line.indent => Some(f.taken),
                    _ => None,
                };
                match chain_open {
                    Some(false) => {
                        let met = match cond {
                            Some(c) => self.eval_cond_or_warn(id, line.line_no, c),
                            None => false,
                        };
                        if met {
                            if let Some(f) = if_stack.last_mut() {
                                f.taken = true;
                            }
                            cursor + 1
                        } else {
                            skip_to
                        }
                    }
                    Some(true) => skip_to,
                    None => {
                        self.warn(
                            id,
                            Some(line.line_no),
                            WarningKind::RuntimeError,
                            "elif without a matching if".into(),
                        );
                        skip_to
                    }
                }
            }
            BranchKind::Else => match if_stack.last_mut() {
                Some(f) if f.indent == line.indent && !f.taken => {
                    f.taken = true;
                    cursor + 1
                }
                Some(f) if f.indent == line.indent => skip_to,
                _ => {
                    self.warn(
                        id,
                        Some(line.line_no),
                        WarningKind::RuntimeError,
                        "else without a matching if".into(),
                    );
                    skip_to
                }
            },
        }
    }

    fn eval_cond_or_warn(&mut self, id: &BlockId, line_no: usize, cond: &ConditionExpr) -> bool {
        match self.eval_cond(id, cond) {
            Ok(v) => v,
            Err(e) => {
                self.warn(
                    id,
                    Some(line_no),
                    WarningKind::RuntimeError,
                    format!("condition treated as false: {e}"),
                );
                false
            }
        }
    }

    /// Left-to-right evaluation with no precedence between `and` and `or`.
    fn eval_cond(&self, id: &BlockId, cond: &ConditionExpr) -> Result<bool, AccessError> {
        let mut acc = self.eval_atom(id, &cond.first)?;
        for (conn, c) in &cond.rest {
            let rhs = self.eval_atom(id, c)?;
            acc = match conn {
                Connective::And => acc && rhs,
                Connective::Or => acc || rhs,
            };
        }
        Ok(acc)
    }

    fn eval_atom(&self, id: &BlockId, cond: &Condition) -> Result<bool, AccessError> {
        match cond {
            Condition::SignalEq { name, value } => Ok(self.store.get_bool(name)? == *value),
            Condition::IntCmp { name, op, operand } => {
                let lhs = self.store.get_int(name)?;
                let rhs = match operand {
                    Operand::Literal(n) => *n,
                    Operand::Variable(v) => self.store.get_int(v)?,
                };
                Ok(op.eval_i64(lhs, rhs))
            }
            Condition::AttrCheck {
                index,
                value,
                negated,
            } => {
                let matched = self
                    .blocks
                    .get(id)
                    .and_then(|b| b.current_entity())
                    .and_then(|e| e.attr(*index))
                    .is_some_and(|a| a == value);
                Ok(matched != *negated)
            }
        }
    }

    fn resolve_operand(&self, operand: &Operand) -> Result<i64, AccessError> {
        match operand {
            Operand::Literal(n) => Ok(*n),
            Operand::Variable(v) => self.store.get_int(v),
        }
    }

    fn sample_delay(&mut self, spec: DelaySpec) -> f64 {
        match spec {
            DelaySpec::Fixed(d) => d,
            DelaySpec::Range(lo, hi) => self.rng.uniform_range(lo, hi),
        }
    }

    fn schedule_woken(&mut self, woken: Vec<BlockId>) {
        for block in woken {
            self.queue
                .push(self.now, block, WakeReason::WaitSatisfied);
        }
    }

    /// Move an entity through a connector. Returns whether it moved.
    /// Failures clear the transit flag, warn, and leave the entity behind.
    fn transfer(
        &mut self,
        from_id: &BlockId,
        connector: &str,
        target_name: &str,
        entity_id: &EntityId,
        line_no: usize,
    ) -> bool {
        let target = {
            let Some(from) = self.blocks.get(from_id) else {
                return false;
            };
            from.outputs.get(connector).cloned().or_else(|| {
                let direct = BlockId(target_name.to_string());
                self.blocks.contains_key(&direct).then_some(direct)
            })
        };
        let Some(target_id) = target.filter(|t| self.blocks.contains_key(t)) else {
            self.clear_transit(from_id, entity_id);
            self.warn(
                from_id,
                Some(line_no),
                WarningKind::UnknownTarget,
                format!("no route via `{connector}` to `{target_name}`"),
            );
            return false;
        };

        let accepts = self
            .blocks
            .get(&target_id)
            .is_some_and(|t| t.can_accept());
        if !accepts {
            self.clear_transit(from_id, entity_id);
            // One capacity warning per entity per time unit.
            let should_warn = {
                let Some(from) = self.blocks.get_mut(from_id) else {
                    return false;
                };
                let last = from.last_capacity_warn.get(entity_id).copied();
                let due = last.map_or(true, |t| self.now - t >= 1.0);
                if due {
                    from.last_capacity_warn.insert(entity_id.clone(), self.now);
                }
                due
            };
            if should_warn {
                self.warn(
                    from_id,
                    Some(line_no),
                    WarningKind::CapacityRejected,
                    format!("{target_id} is full; {entity_id} stays at {from_id}"),
                );
            }
            return false;
        }

        let entity = {
            let Some(from) = self.blocks.get_mut(from_id) else {
                return false;
            };
            let Some(mut entity) = from.remove_entity(entity_id) else {
                return false;
            };
            entity.state = EntityState::Normal;
            entity.processed_by.insert(from_id.clone());
            from.total_processed += 1;
            if from.active_entity.as_ref() == Some(entity_id) {
                from.active_entity = None;
            }
            entity
        };
        if let Some(target) = self.blocks.get_mut(&target_id) {
            target.add_entity(entity);
        }
        info!(entity = %entity_id, from = %from_id, to = %target_id, "entity moved");
        self.schedule_if_ready(&target_id, self.now);
        true
    }

    fn clear_transit(&mut self, block_id: &BlockId, entity_id: &EntityId) {
        if let Some(block) = self.blocks.get_mut(block_id) {
            if let Some(e) = block.entities.iter_mut().find(|e| &e.id == entity_id) {
                e.state = EntityState::Normal;
            }
        }
    }

    fn attr_add(&mut self, id: &BlockId, line_no: usize, attrs: &[String], color: Option<&str>) {
        let parsed_color = color.map(|c| (c.to_string(), EntityColor::from_name(c)));
        let applied = {
            let Some(block) = self.blocks.get_mut(id) else {
                return;
            };
            match block.current_entity_mut() {
                Some(e) => {
                    e.attributes.extend(attrs.iter().cloned());
                    if let Some((_, Some(c))) = &parsed_color {
                        e.color = *c;
                    }
                    true
                }
                None => false,
            }
        };
        if !applied {
            self.warn(
                id,
                Some(line_no),
                WarningKind::RuntimeError,
                "no entity to add attributes to".into(),
            );
        } else if let Some((word, None)) = &parsed_color {
            self.warn(
                id,
                Some(line_no),
                WarningKind::RuntimeError,
                format!("unknown color `{word}`"),
            );
        }
    }

    fn attr_set(&mut self, id: &BlockId, line_no: usize, index: usize, value: &str) {
        let outcome = {
            let Some(block) = self.blocks.get_mut(id) else {
                return;
            };
            match block.current_entity_mut() {
                Some(e) => match e.attributes.get_mut(index) {
                    Some(slot) => {
                        *slot = value.to_string();
                        Ok(())
                    }
                    None => Err(format!(
                        "attribute index {index} out of range ({} present)",
                        e.attributes.len()
                    )),
                },
                None => Err("no entity to set attributes on".to_string()),
            }
        };
        if let Err(message) = outcome {
            self.warn(id, Some(line_no), WarningKind::RuntimeError, message);
        }
    }

    /// Expand `{name}` and `{entity(i).field}` placeholders.
    fn interpolate(&self, id: &BlockId, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open + 1..];
            match tail.find('}') {
                Some(close) => {
                    let expr = &tail[..close];
                    match self.resolve_placeholder(id, expr) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push('{');
                            out.push_str(expr);
                            out.push('}');
                        }
                    }
                    rest = &tail[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    return out;
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn resolve_placeholder(&self, id: &BlockId, expr: &str) -> Option<String> {
        if let Some(inner) = expr.strip_prefix("entity(") {
            let (index, field) = inner.split_once(").")?;
            let index: usize = index.trim().parse().ok()?;
            let entity = self.blocks.get(id)?.entities.get(index)?;
            return match field.trim() {
                "id" => Some(entity.id.to_string()),
                "type" => Some(entity.attributes.join(",")),
                "color" => Some(entity.color.as_str().to_string()),
                "state" => Some(
                    match entity.state {
                        EntityState::Normal => "normal",
                        EntityState::Transit => "transit",
                    }
                    .to_string(),
                ),
                _ => None,
            };
        }
        if self.store.has_integer(expr) {
            return self.store.get_int(expr).ok().map(|v| v.to_string());
        }
        if self.store.has_signal(expr) {
            return self.store.get_bool(expr).ok().map(|v| v.to_string());
        }
        None
    }
}

/// Drop conditional frames we have moved out of. A frame survives its own
/// indent only when the current line continues the chain (`elif`/`else`).
fn pop_left_frames(if_stack: &mut Vec<IfFrame>, line: &CompiledLine) {
    let continues_chain = matches!(
        line.instr,
        Instruction::Branch {
            kind: BranchKind::Elif | BranchKind::Else,
            ..
        }
    );
    while let Some(frame) = if_stack.last() {
        let leave = frame.indent > line.indent || (!continues_chain && frame.indent == line.indent);
        if leave {
            if_stack.pop();
        } else {
            break;
        }
    }
}
