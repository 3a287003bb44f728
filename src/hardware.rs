//! # Hardware — Cell Registry
//!
//! The registry owns everything a compiled circuit is made of:
//!
//! - **Cells**: toggle cells with a monotonically increasing allocation index
//!   and an initial state.
//! - **Rules**: "when condition holds on this cell, force it to a state".
//! - **Labels**: named cell ranges for the debug view.
//! - **Finishers**: deferred wiring run once after construction (pass 2).
//!
//! ```rust
//! use cssputer::Hardware;
//!
//! let mut hw = Hardware::new();
//! let a = hw.bit(false);
//! let b = hw.bit(true);
//! b.iff(&mut hw, a);
//! hw.finish().unwrap();
//! assert_eq!(hw.cell_count(), 2);
//! assert_eq!(hw.rules().len(), 2);
//! ```

use crate::bits::Memory;
use crate::logic::{substitute, Bool, CellId};
use crate::memo::Memo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::{BitAnd, BitOr, BitXor, Not};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while constructing or finishing a circuit.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CircuitError {
    /// Operand kinds or widths do not line up
    #[error("invalid operand: expected {expected}, got {got}")]
    InvalidOperand { expected: String, got: String },
    /// Memory image does not fit the declared address space
    #[error("memory image of {image} rows exceeds capacity of {capacity}")]
    CapacityExceeded { image: usize, capacity: usize },
    /// A shared carry pool ran out of cells
    #[error("carry pool exhausted: need {needed}, have {available}")]
    CarryPoolExhausted { needed: usize, available: usize },
    /// Two rules with the same condition drive a cell to opposite states
    #[error("cell i{cell} is driven to both states under the same condition")]
    ConflictingDrive { cell: CellId },
    #[error("finishers already ran")]
    AlreadyFinished,
    #[error("circuit is not finished")]
    NotFinished,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CircuitError {
    pub(crate) fn width(expected: usize, got: usize) -> Self {
        CircuitError::InvalidOperand {
            expected: format!("width {}", expected),
            got: format!("width {}", got),
        }
    }
}

/// A single toggle cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bit {
    id: CellId,
}

impl Bit {
    pub(crate) fn new(id: CellId) -> Self {
        Bit { id }
    }

    pub fn id(self) -> CellId {
        self.id
    }

    /// Force to 1 whenever `cond` holds.
    pub fn if_<C: Into<Bool>>(self, hw: &mut Hardware, cond: C) {
        hw.add_rule(self, true, cond.into());
    }

    /// Force to 0 whenever `cond` holds.
    pub fn not_if<C: Into<Bool>>(self, hw: &mut Hardware, cond: C) {
        hw.add_rule(self, false, cond.into());
    }

    /// Follow `cond` unconditionally.
    pub fn iff<C: Into<Bool>>(self, hw: &mut Hardware, cond: C) {
        let cond = cond.into();
        self.if_(hw, &cond);
        self.not_if(hw, !cond);
    }

    /// Follow `cond` while `when` holds, hold otherwise.
    pub fn iff_when<C: Into<Bool>, W: Into<Bool>>(self, hw: &mut Hardware, cond: C, when: W) {
        let cond = cond.into();
        let when = when.into();
        self.if_(hw, &cond & &when);
        self.not_if(hw, !cond & when);
    }

    pub fn iff_not<C: Into<Bool>>(self, hw: &mut Hardware, cond: C) {
        let cond = cond.into();
        self.if_(hw, !&cond);
        self.not_if(hw, cond);
    }

    pub fn iff_not_when<C: Into<Bool>, W: Into<Bool>>(self, hw: &mut Hardware, cond: C, when: W) {
        let cond = cond.into();
        let when = when.into();
        self.if_(hw, !&cond & &when);
        self.not_if(hw, cond & when);
    }

    /// Unconditional drive.
    pub fn set(self, hw: &mut Hardware, value: bool) {
        hw.add_rule(self, value, Bool::True);
    }

    pub fn label(self, hw: &mut Hardware, name: &str) {
        hw.label(&[self], name);
    }
}

impl Bool {
    /// Copy into a freshly allocated cell that follows this value.
    pub fn stage(&self, hw: &mut Hardware) -> Bit {
        let bit = hw.bit(false);
        bit.iff(hw, self);
        bit
    }
}

impl From<Bit> for Bool {
    fn from(bit: Bit) -> Self {
        Bool::Expr(crate::logic::Expr::Cell(bit.id))
    }
}

impl From<&Bit> for Bool {
    fn from(bit: &Bit) -> Self {
        Bool::from(*bit)
    }
}

impl Not for Bit {
    type Output = Bool;

    fn not(self) -> Bool {
        !Bool::from(self)
    }
}

impl<T: Into<Bool>> BitAnd<T> for Bit {
    type Output = Bool;

    fn bitand(self, other: T) -> Bool {
        Bool::from(self) & other
    }
}

impl<T: Into<Bool>> BitOr<T> for Bit {
    type Output = Bool;

    fn bitor(self, other: T) -> Bool {
        Bool::from(self) | other
    }
}

impl<T: Into<Bool>> BitXor<T> for Bit {
    type Output = Bool;

    fn bitxor(self, other: T) -> Bool {
        Bool::from(self) ^ other
    }
}

/// Conditional drive of one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub target: CellId,
    /// State the cell is forced to
    pub drive: bool,
    /// Never `Bool::False`; such rules are dropped at emission
    pub condition: Bool,
}

impl Rule {
    pub const SWITCH: &'static str = "{display:block;}";

    /// Selector matching the target cell while the condition holds.
    pub fn selector(&self) -> String {
        match self.condition.pattern() {
            Some(pattern) => substitute(&pattern, self.target),
            None => format!("#i{}", self.target),
        }
    }

    /// Full rule text: the toggle becomes visible when the cell is in the
    /// opposite state of its drive.
    pub fn css(&self) -> String {
        let state = if self.drive { ":not(:checked)" } else { ":checked" };
        format!("{}{}{}", self.selector(), state, Self::SWITCH)
    }
}

/// Named, inclusive range of cell ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub start: CellId,
    pub end: CellId,
    pub name: String,
}

/// Identity of a carry pool, used as the memoization key fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(usize);

/// Cells shared between arithmetic sites that retire in the same cycle.
///
/// Every arithmetic call draws from a fresh copy of the pool, so two sites
/// handed the same pool reuse the same carry cells.
#[derive(Debug, Clone)]
pub struct CarryPool {
    id: PoolId,
    bits: Vec<Bit>,
}

impl CarryPool {
    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub(crate) fn draw(&self, needed: usize) -> Result<Vec<Bit>, CircuitError> {
        if self.bits.len() < needed {
            return Err(CircuitError::CarryPoolExhausted {
                needed,
                available: self.bits.len(),
            });
        }
        Ok(self.bits.clone())
    }
}

type Finisher = Box<dyn FnOnce(&mut Hardware) -> Result<(), CircuitError>>;

/// The cell registry and rule accumulator.
#[derive(Default)]
pub struct Hardware {
    cells: Vec<bool>,
    rules: Vec<Rule>,
    labels: Vec<Label>,
    finishers: Vec<Finisher>,
    finished: bool,
    drives: HashMap<(CellId, Bool), bool>,
    conflicts: Vec<CellId>,
    pools: usize,
    pub(crate) memo: Memo,
}

impl Hardware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate one cell with its initial state.
    pub fn bit(&mut self, value: bool) -> Bit {
        let id = self.cells.len();
        self.cells.push(value);
        Bit::new(id)
    }

    /// Allocate `n` cleared cells.
    pub fn alloc(&mut self, n: usize) -> Memory {
        Memory::from_bits((0..n).map(|_| self.bit(false)).collect())
    }

    /// Allocate cells holding the given initial values.
    pub fn constant(&mut self, values: &[bool]) -> Memory {
        Memory::from_bits(values.iter().map(|v| self.bit(*v)).collect())
    }

    pub fn carry_pool(&mut self, n: usize) -> CarryPool {
        let id = PoolId(self.pools);
        self.pools += 1;
        let bits = self.alloc(n).bits().to_vec();
        debug!(pool = id.0, cells = n, "allocated carry pool");
        CarryPool { id, bits }
    }

    /// Record a drive rule. Constant-false conditions never fire and are dropped.
    pub fn add_rule(&mut self, target: Bit, drive: bool, condition: Bool) {
        debug_assert!(target.id < self.cells.len(), "rule targets unallocated cell");
        if condition == Bool::False {
            return;
        }
        let key = (target.id, condition);
        match self.drives.get(&key).copied() {
            Some(previous) if previous != drive => {
                warn!(cell = target.id, "conflicting drive rules under one condition");
                self.conflicts.push(target.id);
            }
            Some(_) => {}
            None => {
                self.drives.insert(key.clone(), drive);
            }
        }
        self.rules.push(Rule {
            target: target.id,
            drive,
            condition: key.1,
        });
    }

    pub fn register_finisher<F>(&mut self, finisher: F)
    where
        F: FnOnce(&mut Hardware) -> Result<(), CircuitError> + 'static,
    {
        self.finishers.push(Box::new(finisher));
    }

    /// Pass 2: run every finisher once, in registration order.
    pub fn finish(&mut self) -> Result<(), CircuitError> {
        if self.finished {
            return Err(CircuitError::AlreadyFinished);
        }
        self.finished = true;
        let mut ran = 0usize;
        while !self.finishers.is_empty() {
            let batch = std::mem::take(&mut self.finishers);
            for finisher in batch {
                finisher(self)?;
                ran += 1;
            }
        }
        debug!(finishers = ran, rules = self.rules.len(), "finished circuit");
        if let Some(cell) = self.conflicts.first() {
            return Err(CircuitError::ConflictingDrive { cell: *cell });
        }
        Ok(())
    }

    pub fn label(&mut self, bits: &[Bit], name: &str) {
        let (Some(start), Some(end)) = (
            bits.iter().map(|b| b.id).min(),
            bits.iter().map(|b| b.id).max(),
        ) else {
            return;
        };
        self.labels.push(Label {
            start,
            end,
            name: name.to_string(),
        });
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Initial state of every declared cell, by allocation index.
    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn memo_hits(&self) -> usize {
        self.memo.hits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::Simulator;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn allocation_is_monotonic() {
        let mut hw = Hardware::new();
        let a = hw.bit(false);
        let mem = hw.alloc(3);
        let b = hw.bit(true);
        assert_eq!(a.id(), 0);
        assert_eq!(mem.bits().iter().map(|b| b.id()).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(b.id(), 4);
        assert_eq!(hw.cells(), &[false, false, false, false, true]);
    }

    #[test]
    fn rule_text_matches_target_format() {
        let mut hw = Hardware::new();
        let a = hw.bit(false);
        let b = hw.bit(false);
        b.iff(&mut hw, a);
        a.set(&mut hw, true);
        let texts: Vec<String> = hw.rules().iter().map(Rule::css).collect();
        assert_eq!(
            texts,
            vec![
                ":is(#i0:checked~#i1):not(:checked){display:block;}".to_string(),
                ":is(#i1:not(#i0:checked~#i1)):checked{display:block;}".to_string(),
                "#i0:not(:checked){display:block;}".to_string(),
            ]
        );
    }

    #[test]
    fn inverted_drives_follow_the_complement() {
        let mut hw = Hardware::new();
        let cond = hw.bit(false);
        let when = hw.bit(false);
        let follower = hw.bit(false);
        let gated = hw.bit(true);
        follower.iff_not(&mut hw, cond);
        gated.iff_not_when(&mut hw, cond, when);
        hw.finish().unwrap();

        let mut sim = Simulator::new(&hw);
        for (c, w) in [(false, false), (true, false), (true, true), (false, true), (false, false)] {
            let held = sim.get(gated);
            sim.force(cond, c);
            sim.force(when, w);
            sim.settle(100).unwrap();
            assert_eq!(sim.get(follower), !c, "cond={}", c);
            let expected = if w { !c } else { held };
            assert_eq!(sim.get(gated), expected, "cond={} when={}", c, w);
        }
    }

    #[test]
    fn false_conditions_emit_nothing() {
        let mut hw = Hardware::new();
        let a = hw.bit(false);
        a.if_(&mut hw, false);
        a.iff_when(&mut hw, true, false);
        assert!(hw.rules().is_empty());
    }

    #[test]
    fn finishers_run_once_in_order() {
        let mut hw = Hardware::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for idx in 0..3 {
            let log = log.clone();
            hw.register_finisher(move |_| {
                log.borrow_mut().push(idx);
                Ok(())
            });
        }
        hw.finish().unwrap();
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(hw.finish(), Err(CircuitError::AlreadyFinished));
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn opposite_drives_under_same_condition_are_rejected() {
        let mut hw = Hardware::new();
        let a = hw.bit(false);
        let b = hw.bit(false);
        b.if_(&mut hw, a);
        b.not_if(&mut hw, a);
        assert_eq!(hw.finish(), Err(CircuitError::ConflictingDrive { cell: 1 }));
    }

    #[test]
    fn opposite_drives_under_commuted_condition_are_rejected() {
        let mut hw = Hardware::new();
        let a = hw.bit(false);
        let c = hw.bit(false);
        let b = hw.bit(false);
        b.if_(&mut hw, a & c);
        b.not_if(&mut hw, c & a);
        assert_eq!(hw.finish(), Err(CircuitError::ConflictingDrive { cell: 2 }));
    }

    #[test]
    fn repeated_identical_drives_are_allowed() {
        let mut hw = Hardware::new();
        let a = hw.bit(false);
        a.set(&mut hw, false);
        a.set(&mut hw, false);
        assert!(hw.finish().is_ok());
        assert_eq!(hw.rules().len(), 2);
    }

    #[test]
    fn labels_span_min_to_max() {
        let mut hw = Hardware::new();
        let mem = hw.alloc(4);
        mem.label(&mut hw, "reg");
        hw.label(&[], "empty");
        assert_eq!(
            hw.labels(),
            &[Label {
                start: 0,
                end: 3,
                name: "reg".into()
            }]
        );
    }

    #[test]
    fn staged_bool_gets_its_own_cell() {
        let mut hw = Hardware::new();
        let a = hw.bit(false);
        let b = hw.bit(false);
        let staged = (a & !b).stage(&mut hw);
        assert_eq!(staged.id(), 2);
        assert_eq!(hw.rules().len(), 2);
        let constant = Bool::True.stage(&mut hw);
        let drives: Vec<bool> = hw
            .rules()
            .iter()
            .filter(|r| r.target == constant.id())
            .map(|r| r.drive)
            .collect();
        assert_eq!(drives, vec![true]);
    }

    #[test]
    fn carry_pool_reports_exhaustion() {
        let mut hw = Hardware::new();
        let pool = hw.carry_pool(2);
        assert_eq!(pool.len(), 2);
        assert_eq!(
            pool.draw(3).unwrap_err(),
            CircuitError::CarryPoolExhausted {
                needed: 3,
                available: 2
            }
        );
    }
}
