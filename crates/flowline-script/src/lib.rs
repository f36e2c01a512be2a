// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Block script language.
//!
//! Scripts describe block behaviour in a small line-oriented language:
//!
//! ```text
//! force execution
//! delay 2-4
//! int produced += 1
//! if station ready = true
//!     go R to inspection(0,1)
//! else
//!     wait station ready = true
//! ```
//!
//! [`compile`] turns source text into a [`CompiledScript`]: a flat
//! instruction list with branch bodies and jump targets resolved, plus any
//! warnings for lines that did not parse. Compilation never fails; bad
//! lines become warned no-ops so a whole setup always loads.

pub mod compiler;
pub mod instruction;
pub mod lexer;

pub use compiler::compile;
pub use lexer::{LexError, Token};
pub use instruction::{
    ArithOp, BranchKind, CmpOp, CompileWarning, CompiledLine, CompiledScript, Condition,
    ConditionExpr, Connective, DelaySpec, Instruction, Operand,
};
