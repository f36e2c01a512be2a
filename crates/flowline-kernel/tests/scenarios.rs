//! End-to-end scenarios driving the engine through full setups.

use flowline_kernel::{
    BlockConfig, CompletionReason, Engine, EntityState, SimulationSetup, StopCondition,
    VariableConfig, VariableSnapshot, WarningKind,
};

fn block(id: &str, script: &str, outputs: &[(&str, &str)]) -> BlockConfig {
    BlockConfig {
        id: id.to_string(),
        name: None,
        capacity: None,
        script: script.to_string(),
        outputs: outputs
            .iter()
            .map(|(c, t)| (c.to_string(), t.to_string()))
            .collect(),
    }
}

fn setup(blocks: Vec<BlockConfig>) -> SimulationSetup {
    SimulationSetup {
        blocks,
        variables: Vec::new(),
        seed: 0,
    }
}

fn engine_with(config: SimulationSetup) -> Engine {
    let mut engine = Engine::new();
    engine.setup(config).unwrap();
    engine
}

fn int_value(engine: &Engine, name: &str) -> i64 {
    engine
        .variables()
        .into_iter()
        .find_map(|v| match v {
            VariableSnapshot::Integer { name: n, value, .. } if n == name => Some(value),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no integer `{name}`"))
}

/// A source feeds a sink over a fixed delay; entities arrive and are
/// consumed every two time units.
#[test]
fn linear_flow_source_to_sink() {
    let mut engine = engine_with(setup(vec![
        block("src", "delay 2\ngo R to sink", &[("R", "sink")]),
        block("sink", "", &[]),
    ]));

    let result = engine.run(StopCondition::UntilProcessed(3)).unwrap();
    assert_eq!(result.completion_reason, CompletionReason::ProcessedTargetReached);
    assert_eq!(result.final_state.entities_processed_total, 3);
    assert_eq!(result.final_time, 6.0);
}

/// A bounded downstream block rejects overflow; the rejected entity stays
/// put, a capacity warning is recorded, and the retry eventually lands.
#[test]
fn capacity_rejection_and_retry() {
    let mut engine = engine_with(setup(vec![
        block("a", "go R to b", &[("R", "b")]),
        BlockConfig {
            capacity: Some(1),
            ..block("b", "delay 5", &[])
        },
    ]));

    let mut saw_rejection = false;
    for _ in 0..100 {
        let step = engine.step().unwrap();
        // The capacity bound must hold at every observable point.
        let b = step.blocks.iter().find(|s| s.id == "b".into()).unwrap();
        assert!(b.entity_count <= 1);
        saw_rejection |= step
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::CapacityRejected);
        if step.entities_processed_total >= 2 {
            break;
        }
    }
    assert!(saw_rejection);
    assert_eq!(engine.entities_processed_total(), 2);
    assert_eq!(engine.current_time(), 10.0);
}

/// Repeated rejections of the same entity warn at most once per time unit.
#[test]
fn capacity_warnings_are_rate_limited() {
    let mut engine = engine_with(setup(vec![
        block(
            "a",
            "force execution\ncreate product\ngo R to b\ncreate product\ngo R to b\ndelay 0.2\njump to 5",
            &[("R", "b")],
        ),
        BlockConfig {
            capacity: Some(1),
            ..block("b", "wait never = true", &[])
        },
    ]));

    let result = engine.run(StopCondition::UntilTime(3.05)).unwrap();
    let rejections = result
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::CapacityRejected)
        .count();
    // Sixteen-ish attempts in three time units, but at most one warning
    // per unit for the stuck entity.
    assert!(rejections >= 2, "expected some rejections, got {rejections}");
    assert!(rejections <= 5, "rate limit failed, got {rejections} warnings");
}

/// Setting a signal wakes only waiters expecting that value, and the
/// waiting script resumes at the set instant.
#[test]
fn signal_wait_wakes_on_matching_value() {
    let mut engine = engine_with(setup(vec![
        block(
            "w",
            "force execution\nwait door open = true\nint woke += 1\nwait stop = true",
            &[],
        ),
        block(
            "s",
            "force execution\ndoor open = false\ndelay 2\ndoor open = true\nwait stop = true",
            &[],
        ),
    ]));

    let result = engine.run(StopCondition::UntilTime(5.0)).unwrap();
    assert_eq!(int_value(&engine, "woke"), 1);
    // The waiter ran at the moment of the set, not later.
    assert_eq!(result.final_time, 2.0);
    assert_eq!(result.final_state.signals["door open"], true);
}

/// An and-chain wait re-checks its whole condition on every wake; one
/// satisfied atom is not enough.
#[test]
fn wait_recheck_on_partial_condition() {
    let mut engine = engine_with(setup(vec![
        block(
            "w",
            "force execution\nwait a = true and b = true\nint both += 1\nwait stop = true",
            &[],
        ),
        block(
            "s",
            "force execution\ndelay 1\na = true\ndelay 1\nint checkpoint = both\nb = true\nwait stop = true",
            &[],
        ),
    ]));

    engine.run(StopCondition::UntilTime(5.0)).unwrap();
    // At t=2, just before b was set, the waiter had not run.
    assert_eq!(int_value(&engine, "checkpoint"), 0);
    assert_eq!(int_value(&engine, "both"), 1);
}

/// Or-chain waits fire on the first satisfied atom.
#[test]
fn wait_or_chain_fires_on_either() {
    let mut engine = engine_with(setup(vec![
        block(
            "w",
            "force execution\nwait a = true or b = true\nint woke += 1\nwait stop = true",
            &[],
        ),
        block(
            "s",
            "force execution\ndelay 2\nb = true\nwait stop = true",
            &[],
        ),
    ]));
    engine.run(StopCondition::UntilTime(4.0)).unwrap();
    assert_eq!(int_value(&engine, "woke"), 1);
}

/// Exactly one branch of an if/elif/else chain runs.
#[test]
fn conditional_chain_takes_one_branch() {
    let config = SimulationSetup {
        blocks: vec![block(
            "w",
            concat!(
                "force execution\n",
                "if mode = true\n",
                "    int yes += 1\n",
                "elif alt = true\n",
                "    int maybe += 1\n",
                "else\n",
                "    int no += 1\n",
                "wait stop = true",
            ),
            &[],
        )],
        variables: vec![
            VariableConfig::Boolean {
                name: "mode".into(),
                initial: false,
            },
            VariableConfig::Boolean {
                name: "alt".into(),
                initial: true,
            },
        ],
        seed: 0,
    };
    let mut engine = engine_with(config);
    engine.run(StopCondition::MaxSteps(5)).unwrap();
    assert_eq!(int_value(&engine, "yes"), 0);
    assert_eq!(int_value(&engine, "maybe"), 1);
    assert_eq!(int_value(&engine, "no"), 0);
}

/// A breakpoint inside an untaken branch never fires; the branch body is
/// skipped wholesale, not stepped through.
#[test]
fn breakpoint_in_untaken_branch_never_fires() {
    let script = concat!(
        "force execution\n",
        "if mode = true\n",
        "    int hidden += 1\n",
        "int after += 1\n",
        "wait stop = true",
    );
    let config = |mode: bool| SimulationSetup {
        blocks: vec![block("w", script, &[])],
        variables: vec![VariableConfig::Boolean {
            name: "mode".into(),
            initial: mode,
        }],
        seed: 0,
    };

    let mut engine = engine_with(config(false));
    engine.set_breakpoint(&"w".into(), 3);
    let result = engine.run(StopCondition::MaxSteps(5)).unwrap();
    assert_eq!(result.completion_reason, CompletionReason::QueueDrained);
    assert!(!engine.debug_info().paused);
    assert_eq!(int_value(&engine, "hidden"), 0);
    assert_eq!(int_value(&engine, "after"), 1);

    // Same breakpoint on the taken path does fire.
    let mut engine = engine_with(config(true));
    engine.set_breakpoint(&"w".into(), 3);
    let step = engine.step().unwrap();
    assert!(step.debug.paused);
    assert_eq!(step.debug.current_line, Some(3));
    assert_eq!(int_value(&engine, "hidden"), 0);
}

/// `jump to` drives a script loop until its guard turns false.
#[test]
fn jump_loop_until_condition() {
    let mut engine = engine_with(setup(vec![block(
        "w",
        "force execution\nint i += 1\nif i < 3\n    jump to 2\nwait stop = true",
        &[],
    )]));
    engine.run(StopCondition::MaxSteps(5)).unwrap();
    assert_eq!(int_value(&engine, "i"), 3);
}

/// Two scripts waiting on signals nobody sets: the queue drains with both
/// parked, surfacing the deadlock instead of spinning.
#[test]
fn mutual_wait_drains_queue() {
    let mut engine = engine_with(setup(vec![
        block("p", "force execution\nwait from q = true", &[]),
        block("q", "force execution\nwait from p = true", &[]),
    ]));
    let result = engine.run(StopCondition::MaxSteps(50)).unwrap();
    assert_eq!(result.completion_reason, CompletionReason::QueueDrained);
    assert_eq!(result.final_time, 0.0);
}

/// Breakpoints pause before the instruction without consuming virtual
/// time; step executes exactly one instruction; continue runs free.
#[test]
fn breakpoint_pause_step_continue() {
    let mut engine = engine_with(setup(vec![block(
        "w",
        "force execution\nint a += 1\nint b += 1\nint c += 1\nwait stop = true",
        &[],
    )]));
    engine.set_breakpoint(&"w".into(), 3);
    engine.set_breakpoint(&"w".into(), 3); // idempotent

    let step = engine.step().unwrap();
    assert!(step.debug.paused);
    assert_eq!(step.debug.current_block, Some("w".into()));
    assert_eq!(step.debug.current_line, Some(3));
    assert_eq!(step.time, 0.0);
    assert_eq!(int_value(&engine, "a"), 1);
    assert_eq!(int_value(&engine, "b"), 0);

    // Stepping runs line 3 only, pausing again at line 4.
    let step = engine.debug_step().unwrap();
    assert!(step.debug.paused);
    assert_eq!(step.debug.current_line, Some(4));
    assert_eq!(int_value(&engine, "b"), 1);
    assert_eq!(int_value(&engine, "c"), 0);

    // Continue runs to the wait; no virtual time passed.
    let step = engine.debug_continue().unwrap();
    assert!(!step.debug.paused);
    assert_eq!(int_value(&engine, "c"), 1);
    assert_eq!(engine.current_time(), 0.0);

    // While running, debug control is rejected.
    assert!(engine.debug_continue().is_err());
}

/// A stepwise `step()` while paused does not advance the simulation.
#[test]
fn step_while_paused_is_inert() {
    let mut engine = engine_with(setup(vec![block(
        "w",
        "force execution\nint a += 1\nwait stop = true",
        &[],
    )]));
    engine.set_breakpoint(&"w".into(), 2);
    engine.step().unwrap();
    assert_eq!(int_value(&engine, "a"), 0);

    let before = engine.current_time();
    let step = engine.step().unwrap();
    assert!(step.debug.paused);
    assert_eq!(engine.current_time(), before);
    assert_eq!(int_value(&engine, "a"), 0);
}

/// Pre-move transport delay: the entity rides in transit, still counted
/// against the source block, then lands normally.
#[test]
fn transit_during_routed_delay() {
    let mut engine = engine_with(setup(vec![
        block("src", "go R to dst(0,2)", &[("R", "dst")]),
        block("dst", "wait hold = true", &[]),
    ]));

    let step = engine.step().unwrap();
    let e = &step.active_entities[0];
    assert_eq!(e.block, "src".into());
    assert_eq!(e.state, EntityState::Transit);

    let step = engine.step().unwrap();
    assert_eq!(step.time, 2.0);
    let e = &step.active_entities[0];
    assert_eq!(e.block, "dst".into());
    assert_eq!(e.state, EntityState::Normal);
}

/// Attribute edits and recoloring apply to the handled entity.
#[test]
fn product_attributes_and_color() {
    let mut engine = engine_with(setup(vec![
        block(
            "src",
            "product type += clean,dry(green)\nproduct type(1) = wet\ngo R to dst",
            &[("R", "dst")],
        ),
        block("dst", "wait hold = true", &[]),
    ]));

    let mut arrived = None;
    for _ in 0..10 {
        let step = engine.step().unwrap();
        if let Some(e) = step.active_entities.iter().find(|e| e.block == "dst".into()) {
            arrived = Some(e.clone());
            break;
        }
    }
    let e = arrived.expect("entity never reached dst");
    assert_eq!(e.attributes, vec!["clean".to_string(), "wet".to_string()]);
    assert_eq!(format!("{:?}", e.color), "Green");
}

/// `execute` triggers another block's script even though it holds no work;
/// `.status =` labels it.
#[test]
fn execute_and_status_cross_block() {
    let mut engine = engine_with(setup(vec![
        block(
            "ctl",
            "force execution\nhelper.status = \"busy\"\nexecute helper\nwait stop = true",
            &[],
        ),
        block("helper", "int ran += 1\nwait stop = true", &[]),
    ]));

    engine.run(StopCondition::MaxSteps(10)).unwrap();
    assert_eq!(int_value(&engine, "ran"), 1);
    let helper = engine.block(&"helper".into()).unwrap();
    assert_eq!(helper.status.as_deref(), Some("busy"));
}

/// `log` interpolates variables and entity fields.
#[test]
fn log_interpolation() {
    let mut engine = engine_with(setup(vec![block(
        "w",
        "force execution\nint count += 4\nlog \"count is {count} and missing is {nope}\"\nwait stop = true",
        &[],
    )]));
    let result = engine.run(StopCondition::MaxSteps(5)).unwrap();
    assert_eq!(result.log.len(), 1);
    assert_eq!(result.log[0].message, "count is 4 and missing is {nope}");
}

/// Identical setup and seed replay byte-for-byte, including random delays.
#[test]
fn deterministic_replay_with_ranged_delays() {
    let config = SimulationSetup {
        blocks: vec![
            block("src", "delay 1-3\ngo R to sink", &[("R", "sink")]),
            block("sink", "", &[]),
        ],
        variables: Vec::new(),
        seed: 99,
    };

    let mut first = engine_with(config.clone());
    let mut second = engine_with(config);
    let a = first.run(StopCondition::UntilProcessed(10)).unwrap();
    let b = second.run(StopCondition::UntilProcessed(10)).unwrap();
    assert_eq!(a, b);
    assert!(a.final_time > 0.0);
}

/// Reset rewinds to the post-setup state; a re-run reproduces the first.
#[test]
fn reset_then_rerun_reproduces() {
    let config = SimulationSetup {
        blocks: vec![
            block("src", "delay 1-3\ngo R to sink", &[("R", "sink")]),
            block("sink", "", &[]),
        ],
        variables: Vec::new(),
        seed: 7,
    };
    let mut engine = engine_with(config);
    let a = engine.run(StopCondition::UntilProcessed(5)).unwrap();
    engine.reset().unwrap();
    let b = engine.run(StopCondition::UntilProcessed(5)).unwrap();
    assert_eq!(a.final_time, b.final_time);
    assert_eq!(
        a.final_state.entities_processed_total,
        b.final_state.entities_processed_total
    );
}

/// A jump cycle with no delay or wait is cut off instead of hanging the
/// caller, and the block goes dormant.
#[test]
fn runaway_jump_loop_is_aborted() {
    let mut engine = engine_with(setup(vec![block(
        "w",
        "force execution\njump to 2",
        &[],
    )]));
    let result = engine.run(StopCondition::MaxSteps(5)).unwrap();
    assert_eq!(result.completion_reason, CompletionReason::QueueDrained);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::RuntimeError && w.message.contains("without yielding")));
}

/// Divide-by-zero and type mismatches warn and continue; the run is not
/// aborted.
#[test]
fn runtime_errors_warn_and_continue() {
    let config = SimulationSetup {
        blocks: vec![block(
            "w",
            concat!(
                "force execution\n",
                "int n = 9\n",
                "int n /= 0\n",
                "int m = -9223372036854775807\n",
                "int m -= 1\n",
                "int m /= -1\n",
                "int after += 1\n",
                "wait stop = true",
            ),
            &[],
        )],
        variables: Vec::new(),
        seed: 0,
    };
    let mut engine = engine_with(config);
    let result = engine.run(StopCondition::MaxSteps(5)).unwrap();
    let runtime_warnings = result
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::RuntimeError)
        .count();
    assert_eq!(runtime_warnings, 2);
    assert_eq!(int_value(&engine, "n"), 9);
    assert_eq!(int_value(&engine, "m"), i64::MIN);
    assert_eq!(int_value(&engine, "after"), 1);
}
