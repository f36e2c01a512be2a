// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Discrete-event process-flow simulation kernel.
//!
//! Entities travel between blocks under the control of per-block scripts;
//! a virtual-time event queue orders everything by `(time, insertion)`, so
//! the same setup with the same seed replays identically. There is no wall
//! clock and no parallelism: a script only yields at `delay`, an
//! unsatisfied `wait`, or a breakpoint, and between those points it runs
//! atomically.
//!
//! Typical use:
//!
//! ```no_run
//! use flowline_kernel::{Engine, SimulationSetup, StopCondition};
//!
//! # fn main() -> flowline_kernel::Result<()> {
//! let setup: SimulationSetup = serde_json::from_str("...").unwrap();
//! let mut engine = Engine::new();
//! engine.setup(setup)?;
//! let result = engine.run(StopCondition::UntilTime(100.0))?;
//! println!("{} processed", result.final_state.entities_processed_total);
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod config;
pub mod debug;
pub mod engine;
pub mod entity;
pub mod error;
mod interp;
pub mod rng;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod types;

pub use config::{BlockConfig, SimulationSetup, VariableConfig};
pub use debug::DebugInfo;
pub use engine::{Engine, StopCondition};
pub use entity::{Entity, EntityColor, EntityState};
pub use error::{Error, Result};
pub use snapshot::{
    BlockSnapshot, CompletionReason, EntitySnapshot, RunResult, StepResult, VariableSnapshot,
};
pub use types::{BlockId, EntityId, LogEntry, SimTime, Warning, WarningKind};
