//! Compiled script representation.
//!
//! A script compiles to a flat `Vec<CompiledLine>`; control flow is resolved
//! positionally (branch bodies by indentation, jumps by source line number)
//! so the interpreter never re-inspects source text.

use serde::{Deserialize, Serialize};

/// Duration argument of a `delay` (or the optional `go` pre-move delay).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DelaySpec {
    /// Exact duration in virtual time units.
    Fixed(f64),
    /// Uniform draw from the inclusive range.
    Range(f64, f64),
}

/// Right-hand side of an integer operation: a literal or another variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Literal(i64),
    Variable(String),
}

/// Integer assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
}

/// Comparison operators usable in conditions and waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    pub fn eval_i64(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
        }
    }
}

/// A single condition atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// `name = true` / `name = false`
    SignalEq { name: String, value: bool },
    /// `name > 3`, `name != other`
    IntCmp {
        name: String,
        op: CmpOp,
        operand: Operand,
    },
    /// `product type(i) = value` / `!=`
    AttrCheck {
        index: usize,
        value: String,
        negated: bool,
    },
}

/// How two adjacent condition atoms combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connective {
    And,
    Or,
}

/// A left-to-right chain of conditions with no precedence between
/// `and` and `or`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionExpr {
    pub first: Condition,
    pub rest: Vec<(Connective, Condition)>,
}

impl ConditionExpr {
    /// All signal-equality atoms, for wait registration.
    pub fn signal_atoms(&self) -> impl Iterator<Item = (&str, bool)> {
        std::iter::once(&self.first)
            .chain(self.rest.iter().map(|(_, c)| c))
            .filter_map(|c| match c {
                Condition::SignalEq { name, value } => Some((name.as_str(), *value)),
                _ => None,
            })
    }

    /// All integer-comparison variable names, for wait registration.
    pub fn int_atoms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(&self.first)
            .chain(self.rest.iter().map(|(_, c)| c))
            .filter_map(|c| match c {
                Condition::IntCmp { name, .. } => Some(name.as_str()),
                _ => None,
            })
    }
}

/// Branch kind of a conditional line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchKind {
    If,
    Elif,
    Else,
}

/// One executable instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Suspend for a duration.
    Delay { spec: DelaySpec },
    /// Set a boolean signal.
    SignalSet { name: String, value: bool },
    /// Integer variable arithmetic; creates the variable at 0 on first use.
    IntAssign {
        name: String,
        op: ArithOp,
        operand: Operand,
    },
    /// Suspend until the condition holds.
    Wait { cond: ConditionExpr },
    /// Conditional line. `cond` is `None` only for `else`. `skip_to` is the
    /// instruction index just past the branch body.
    Branch {
        kind: BranchKind,
        cond: Option<ConditionExpr>,
        skip_to: usize,
    },
    /// Unconditional jump; `target` is `None` when the source line number
    /// did not resolve to an instruction.
    Jump { line: usize, target: Option<usize> },
    /// Send an entity through a named connector.
    Go {
        connector: String,
        target: String,
        entity_index: usize,
        delay: Option<DelaySpec>,
    },
    /// Append attributes to the current entity, optionally recoloring it.
    AttrAdd {
        attrs: Vec<String>,
        color: Option<String>,
    },
    /// Remove attributes from the current entity.
    AttrRemove { attrs: Vec<String> },
    /// Overwrite one attribute slot of the current entity.
    AttrSet { index: usize, value: String },
    /// Emit a message with `{variable}` / `{entity(i).attr}` interpolation.
    Log { template: String },
    /// Spawn a new entity in this block, subject to capacity.
    CreateProduct,
    /// Destroy the current entity and count it as processed.
    DisposeProduct,
    /// Trigger another block's script at the current instant.
    Execute { block: String },
    /// Set another block's display status string.
    BlockStatus { block: String, status: String },
    /// Unrecognised line; executes as a no-op.
    Unknown { line: String },
}

/// An instruction plus its source position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledLine {
    pub instr: Instruction,
    /// 1-based source line number, the coordinate breakpoints use.
    pub line_no: usize,
    /// Indent width in columns (tab = 4).
    pub indent: usize,
}

/// Warning attached to a script at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileWarning {
    pub line_no: usize,
    pub message: String,
}

/// A fully compiled script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledScript {
    pub lines: Vec<CompiledLine>,
    /// Set when any line reads `force execution`.
    pub force_execution: bool,
    pub warnings: Vec<CompileWarning>,
}

impl CompiledScript {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Instruction index for a 1-based source line, if that line holds one.
    pub fn index_of_line(&self, line_no: usize) -> Option<usize> {
        self.lines.iter().position(|l| l.line_no == line_no)
    }
}
