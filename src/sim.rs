//! # Sim — Reactive Rule Evaluator
//!
//! Evaluates a finished circuit the way the target runtime does. A cell is
//! *pending* when one of its rules is active and demands the opposite state;
//! the runtime exposes its toggle and the operator flips the topmost one,
//! which is the pending cell with the highest allocation index.
//!
//! When several active rules disagree, the last one emitted wins.
//!
//! ```rust
//! use cssputer::{Hardware, Simulator};
//!
//! let mut hw = Hardware::new();
//! let input = hw.bit(false);
//! let output = hw.bit(false);
//! output.iff(&mut hw, !input);
//! hw.finish().unwrap();
//!
//! let mut sim = Simulator::new(&hw);
//! sim.settle(10).unwrap();
//! assert!(sim.get(output));
//! sim.force(input, true);
//! sim.settle(10).unwrap();
//! assert!(!sim.get(output));
//! ```

use crate::bits::{Bools, Memory};
use crate::hardware::{Bit, Hardware};
use crate::logic::{Bool, CellId};
use crate::number::Number;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimError {
    #[error("circuit did not settle within {limit} steps")]
    DidNotSettle { limit: usize },
}

pub struct Simulator<'a> {
    hw: &'a Hardware,
    state: Vec<bool>,
    rules_by_target: Vec<Vec<usize>>,
    dependents: Vec<Vec<CellId>>,
    pending: BTreeSet<CellId>,
    steps: u64,
}

impl<'a> Simulator<'a> {
    pub fn new(hw: &'a Hardware) -> Self {
        let cells = hw.cell_count();
        let mut rules_by_target = vec![Vec::new(); cells];
        let mut dependents: Vec<Vec<CellId>> = vec![Vec::new(); cells];
        let mut referenced = Vec::new();
        for (idx, rule) in hw.rules().iter().enumerate() {
            rules_by_target[rule.target].push(idx);
            if let Bool::Expr(expr) = &rule.condition {
                referenced.clear();
                expr.collect_cells(&mut referenced);
                for cell in &referenced {
                    dependents[*cell].push(rule.target);
                }
            }
        }
        for deps in &mut dependents {
            deps.sort_unstable();
            deps.dedup();
        }
        let mut sim = Simulator {
            hw,
            state: hw.cells().to_vec(),
            rules_by_target,
            dependents,
            pending: BTreeSet::new(),
            steps: 0,
        };
        for cell in 0..cells {
            sim.refresh(cell);
        }
        sim
    }

    /// State demanded by the last active rule on `cell`, if any.
    pub fn demand(&self, cell: CellId) -> Option<bool> {
        let rules = self.hw.rules();
        let state = &self.state;
        self.rules_by_target[cell]
            .iter()
            .rev()
            .map(|idx| &rules[*idx])
            .find(|rule| rule.condition.eval(&|id| state[id]))
            .map(|rule| rule.drive)
    }

    fn refresh(&mut self, cell: CellId) {
        match self.demand(cell) {
            Some(drive) if drive != self.state[cell] => {
                self.pending.insert(cell);
            }
            _ => {
                self.pending.remove(&cell);
            }
        }
    }

    fn propagate(&mut self, cell: CellId) {
        self.refresh(cell);
        for idx in 0..self.dependents[cell].len() {
            let dep = self.dependents[cell][idx];
            self.refresh(dep);
        }
    }

    /// Flip the topmost pending cell. Returns the flipped cell.
    pub fn step(&mut self) -> Option<CellId> {
        let cell = self.pending.pop_last()?;
        self.state[cell] = !self.state[cell];
        self.steps += 1;
        trace!(cell, value = self.state[cell], "flip");
        self.propagate(cell);
        Some(cell)
    }

    /// Step until nothing is pending.
    pub fn settle(&mut self, limit: usize) -> Result<usize, SimError> {
        self.run_until(limit, |_| false)
    }

    /// Step until `stop` holds or nothing is pending. Returns steps taken.
    pub fn run_until<F>(&mut self, limit: usize, stop: F) -> Result<usize, SimError>
    where
        F: Fn(&Simulator<'a>) -> bool,
    {
        let mut taken = 0usize;
        while !stop(self) {
            if self.pending.is_empty() {
                return Ok(taken);
            }
            if taken == limit {
                return Err(SimError::DidNotSettle { limit });
            }
            self.step();
            taken += 1;
        }
        Ok(taken)
    }

    /// Set a cell directly, as an operator click would.
    pub fn force(&mut self, bit: Bit, value: bool) {
        let cell = bit.id();
        if self.state[cell] != value {
            self.state[cell] = value;
            self.propagate(cell);
        }
    }

    pub fn write(&mut self, memory: &Memory, value: u64) {
        for (idx, bit) in memory.bits().iter().enumerate() {
            self.force(*bit, idx < 64 && (value >> idx) & 1 == 1);
        }
    }

    pub fn get(&self, bit: Bit) -> bool {
        self.state[bit.id()]
    }

    pub fn read(&self, memory: &Memory) -> u64 {
        pack(memory.bits().iter().map(|b| self.state[b.id()]))
    }

    pub fn eval(&self, value: &Bool) -> bool {
        let state = &self.state;
        value.eval(&|id| state[id])
    }

    pub fn eval_bools(&self, bools: &Bools) -> u64 {
        pack(bools.iter().map(|b| self.eval(b)))
    }

    pub fn eval_number(&self, number: &Number) -> u64 {
        self.eval_bools(number.bools())
    }

    pub fn is_stable(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

fn pack<I: Iterator<Item = bool>>(bits: I) -> u64 {
    bits.enumerate()
        .filter(|(idx, bit)| *bit && *idx < 64)
        .fold(0u64, |acc, (idx, _)| acc | (1u64 << idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topmost_pending_cell_flips_first() {
        let mut hw = Hardware::new();
        let low = hw.bit(false);
        let high = hw.bit(false);
        low.set(&mut hw, true);
        high.set(&mut hw, true);
        hw.finish().unwrap();
        let mut sim = Simulator::new(&hw);
        assert_eq!(sim.pending(), 2);
        assert_eq!(sim.step(), Some(high.id()));
        assert_eq!(sim.step(), Some(low.id()));
        assert_eq!(sim.step(), None);
        assert_eq!(sim.steps(), 2);
    }

    #[test]
    fn last_active_rule_wins() {
        let mut hw = Hardware::new();
        let trigger = hw.bit(false);
        let cell = hw.bit(false);
        cell.set(&mut hw, false);
        cell.if_(&mut hw, trigger);
        hw.finish().unwrap();
        let mut sim = Simulator::new(&hw);
        assert!(sim.is_stable());
        sim.force(trigger, true);
        sim.settle(10).unwrap();
        assert!(sim.get(cell));
        sim.force(trigger, false);
        sim.settle(10).unwrap();
        assert!(!sim.get(cell));
    }

    #[test]
    fn oscillator_never_settles() {
        let mut hw = Hardware::new();
        let cell = hw.bit(false);
        cell.iff(&mut hw, !cell);
        hw.finish().unwrap();
        let mut sim = Simulator::new(&hw);
        assert_eq!(sim.settle(50), Err(SimError::DidNotSettle { limit: 50 }));
    }

    #[test]
    fn chain_propagates_through_dependents() {
        let mut hw = Hardware::new();
        let chain = hw.alloc(5);
        for idx in 1..5 {
            chain[idx].iff(&mut hw, chain[idx - 1]);
        }
        hw.finish().unwrap();
        let mut sim = Simulator::new(&hw);
        sim.force(chain[0], true);
        let taken = sim.settle(100).unwrap();
        assert_eq!(taken, 4);
        assert_eq!(sim.read(&chain), 0b11111);
    }
}
