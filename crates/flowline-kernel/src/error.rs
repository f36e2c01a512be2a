//! Kernel error type.
//!
//! Errors are reserved for caller misuse of the engine API. Script-level
//! problems (bad lines, failed transports, type mismatches) are warnings
//! recorded on the run, never errors.

use crate::types::BlockId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("engine has no setup loaded; call setup() first")]
    NotSetUp,

    #[error("debugger is not paused")]
    NotPaused,

    #[error("duplicate block id: {0}")]
    DuplicateBlock(BlockId),

    #[error("variable `{name}` declared as both boolean and integer")]
    VariableTypeConflict { name: String },
}

pub type Result<T> = std::result::Result<T, Error>;
