//! Signal and integer variable store with wait registration.
//!
//! Names are free-form strings. Each name belongs to exactly one type for
//! the lifetime of a setup; declaring both is a setup error, and a
//! type-mismatched access at run time is reported to the caller so the
//! interpreter can record a warning and skip the instruction.
//!
//! Blocks suspended on a `wait` register interest here. A boolean
//! registration only fires when the signal is set to its expected value;
//! registrations that do not match stay parked. Integer registrations fire
//! on any mutation of the watched variable, and the woken block re-checks
//! its full condition before proceeding.

use crate::types::BlockId;
use flowline_script::ArithOp;
use indexmap::IndexMap;
use thiserror::Error;
use tracing::trace;

/// Runtime access failure. Surfaces as a recorded warning, never a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("`{0}` is an integer variable, not a signal")]
    NotASignal(String),
    #[error("`{0}` is a signal, not an integer variable")]
    NotAnInteger(String),
    #[error("division by zero on `{0}`")]
    DivisionByZero(String),
    #[error("integer overflow on `{0}`")]
    Overflow(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BoolWaiter {
    block: BlockId,
    name: String,
    expected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IntWaiter {
    block: BlockId,
    name: String,
}

/// Ordered store of boolean signals and integer variables.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    signals: IndexMap<String, bool>,
    signal_initial: IndexMap<String, bool>,
    integers: IndexMap<String, i64>,
    integer_initial: IndexMap<String, i64>,
    bool_waiters: Vec<BoolWaiter>,
    int_waiters: Vec<IntWaiter>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a signal with its initial value. Setup-time only.
    pub fn declare_bool(&mut self, name: &str, initial: bool) -> Result<(), AccessError> {
        if self.integers.contains_key(name) {
            return Err(AccessError::NotASignal(name.to_string()));
        }
        self.signals.insert(name.to_string(), initial);
        self.signal_initial.insert(name.to_string(), initial);
        Ok(())
    }

    /// Declare an integer variable with its initial value. Setup-time only.
    pub fn declare_int(&mut self, name: &str, initial: i64) -> Result<(), AccessError> {
        if self.signals.contains_key(name) {
            return Err(AccessError::NotAnInteger(name.to_string()));
        }
        self.integers.insert(name.to_string(), initial);
        self.integer_initial.insert(name.to_string(), initial);
        Ok(())
    }

    /// Read a signal. Missing signals read as `false`.
    pub fn get_bool(&self, name: &str) -> Result<bool, AccessError> {
        if self.integers.contains_key(name) {
            return Err(AccessError::NotASignal(name.to_string()));
        }
        Ok(self.signals.get(name).copied().unwrap_or(false))
    }

    /// Set a signal, creating it on first use. Returns the blocks whose
    /// registered wait matches the new value; their registrations (all of
    /// them, across names) are removed.
    pub fn set_bool(&mut self, name: &str, value: bool) -> Result<Vec<BlockId>, AccessError> {
        if self.integers.contains_key(name) {
            return Err(AccessError::NotASignal(name.to_string()));
        }
        if !self.signal_initial.contains_key(name) {
            self.signal_initial.insert(name.to_string(), false);
        }
        self.signals.insert(name.to_string(), value);
        trace!(signal = name, value, "signal set");

        let woken: Vec<BlockId> = self
            .bool_waiters
            .iter()
            .filter(|w| w.name == name && w.expected == value)
            .map(|w| w.block.clone())
            .collect();
        let woken = dedup_in_order(woken);
        for block in &woken {
            self.cancel_waits(block);
        }
        Ok(woken)
    }

    /// Read an integer variable. Missing variables read as 0.
    pub fn get_int(&self, name: &str) -> Result<i64, AccessError> {
        if self.signals.contains_key(name) {
            return Err(AccessError::NotAnInteger(name.to_string()));
        }
        Ok(self.integers.get(name).copied().unwrap_or(0))
    }

    /// Apply an arithmetic operation, creating the variable at 0 on first
    /// use. Division is integer division; dividing by zero or overflowing
    /// the quotient fails without mutating. Returns the new value plus the
    /// blocks woken by the mutation.
    pub fn apply_int(
        &mut self,
        name: &str,
        op: ArithOp,
        rhs: i64,
    ) -> Result<(i64, Vec<BlockId>), AccessError> {
        if self.signals.contains_key(name) {
            return Err(AccessError::NotAnInteger(name.to_string()));
        }
        let current = self.integers.get(name).copied().unwrap_or(0);
        let next = match op {
            ArithOp::Assign => rhs,
            ArithOp::Add => current.wrapping_add(rhs),
            ArithOp::Sub => current.wrapping_sub(rhs),
            ArithOp::Mul => current.wrapping_mul(rhs),
            ArithOp::Div => {
                if rhs == 0 {
                    return Err(AccessError::DivisionByZero(name.to_string()));
                }
                // i64::MIN / -1 does not fit.
                match current.checked_div(rhs) {
                    Some(v) => v,
                    None => return Err(AccessError::Overflow(name.to_string())),
                }
            }
        };
        if !self.integer_initial.contains_key(name) {
            self.integer_initial.insert(name.to_string(), 0);
        }
        self.integers.insert(name.to_string(), next);
        trace!(variable = name, value = next, "integer updated");

        let woken: Vec<BlockId> = self
            .int_waiters
            .iter()
            .filter(|w| w.name == name)
            .map(|w| w.block.clone())
            .collect();
        let woken = dedup_in_order(woken);
        for block in &woken {
            self.cancel_waits(block);
        }
        Ok((next, woken))
    }

    /// Park a block until `name` is set to `expected`.
    pub fn register_bool_wait(&mut self, block: &BlockId, name: &str, expected: bool) {
        self.bool_waiters.push(BoolWaiter {
            block: block.clone(),
            name: name.to_string(),
            expected,
        });
    }

    /// Park a block until `name` is mutated.
    pub fn register_int_wait(&mut self, block: &BlockId, name: &str) {
        self.int_waiters.push(IntWaiter {
            block: block.clone(),
            name: name.to_string(),
        });
    }

    /// Drop every registration a block holds.
    pub fn cancel_waits(&mut self, block: &BlockId) {
        self.bool_waiters.retain(|w| &w.block != block);
        self.int_waiters.retain(|w| &w.block != block);
    }

    pub fn has_signal(&self, name: &str) -> bool {
        self.signals.contains_key(name)
    }

    pub fn has_integer(&self, name: &str) -> bool {
        self.integers.contains_key(name)
    }

    pub fn has_waiters(&self) -> bool {
        !self.bool_waiters.is_empty() || !self.int_waiters.is_empty()
    }

    /// Current signal values in declaration order.
    pub fn signals(&self) -> impl Iterator<Item = (&str, bool)> {
        self.signals.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Current integer values in declaration order.
    pub fn integers(&self) -> impl Iterator<Item = (&str, i64)> {
        self.integers.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn initial_bool(&self, name: &str) -> Option<bool> {
        self.signal_initial.get(name).copied()
    }

    pub fn initial_int(&self, name: &str) -> Option<i64> {
        self.integer_initial.get(name).copied()
    }
}

fn dedup_in_order(blocks: Vec<BlockId>) -> Vec<BlockId> {
    let mut out: Vec<BlockId> = Vec::with_capacity(blocks.len());
    for b in blocks {
        if !out.contains(&b) {
            out.push(b);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: &str) -> BlockId {
        BlockId::from(id)
    }

    #[test]
    fn signals_default_false() {
        let store = VariableStore::new();
        assert_eq!(store.get_bool("missing"), Ok(false));
    }

    #[test]
    fn set_wakes_only_matching_waiters() {
        let mut store = VariableStore::new();
        store.register_bool_wait(&block("a"), "ready", true);
        store.register_bool_wait(&block("b"), "ready", false);

        let woken = store.set_bool("ready", true).unwrap();
        assert_eq!(woken, vec![block("a")]);
        // The non-matching waiter stays parked.
        assert!(store.has_waiters());

        let woken = store.set_bool("ready", false).unwrap();
        assert_eq!(woken, vec![block("b")]);
        assert!(!store.has_waiters());
    }

    #[test]
    fn waking_drops_all_registrations_of_the_block() {
        let mut store = VariableStore::new();
        // One block waiting on an or-chain registers both atoms.
        store.register_bool_wait(&block("a"), "x", true);
        store.register_bool_wait(&block("a"), "y", true);

        let woken = store.set_bool("x", true).unwrap();
        assert_eq!(woken, vec![block("a")]);
        assert!(!store.has_waiters());
    }

    #[test]
    fn arithmetic_auto_creates_at_zero() {
        let mut store = VariableStore::new();
        let (v, _) = store.apply_int("count", ArithOp::Add, 5).unwrap();
        assert_eq!(v, 5);
        let (v, _) = store.apply_int("count", ArithOp::Mul, 3).unwrap();
        assert_eq!(v, 15);
        let (v, _) = store.apply_int("count", ArithOp::Div, 2).unwrap();
        assert_eq!(v, 7); // integer division
    }

    #[test]
    fn division_by_zero_fails_without_mutating() {
        let mut store = VariableStore::new();
        store.apply_int("n", ArithOp::Assign, 9).unwrap();
        assert_eq!(
            store.apply_int("n", ArithOp::Div, 0),
            Err(AccessError::DivisionByZero("n".into()))
        );
        assert_eq!(store.get_int("n"), Ok(9));
    }

    #[test]
    fn overflowing_division_fails_without_mutating() {
        let mut store = VariableStore::new();
        store.apply_int("n", ArithOp::Assign, i64::MIN).unwrap();
        assert_eq!(
            store.apply_int("n", ArithOp::Div, -1),
            Err(AccessError::Overflow("n".into()))
        );
        assert_eq!(store.get_int("n"), Ok(i64::MIN));
    }

    #[test]
    fn int_waiters_wake_on_any_mutation() {
        let mut store = VariableStore::new();
        store.register_int_wait(&block("a"), "count");
        let (_, woken) = store.apply_int("count", ArithOp::Add, 1).unwrap();
        assert_eq!(woken, vec![block("a")]);
    }

    #[test]
    fn type_mismatch_is_detected() {
        let mut store = VariableStore::new();
        store.declare_int("count", 0).unwrap();
        assert_eq!(
            store.set_bool("count", true),
            Err(AccessError::NotASignal("count".into()))
        );
        store.declare_bool("door", false).unwrap();
        assert_eq!(
            store.get_int("door"),
            Err(AccessError::NotAnInteger("door".into()))
        );
    }
}
