//! Memoization of arithmetic derivations.
//!
//! Each add, multiply or compare allocates carry cells and emits a carry
//! chain, so the registry caches results by argument. Vectors, literals and
//! conditions are keyed by value. Carry pools have no useful value equality
//! and are keyed by identity: two distinct pools over the same cells never
//! share an entry.

use crate::hardware::{CarryPool, PoolId};
use crate::logic::Bool;
use crate::number::Number;
use std::collections::HashMap;
use tracing::debug;

/// Right-hand side of an arithmetic derivation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Number(Number),
    Literal(u64),
}

impl From<Number> for Operand {
    fn from(n: Number) -> Self {
        Operand::Number(n)
    }
}

impl From<&Number> for Operand {
    fn from(n: &Number) -> Self {
        Operand::Number(n.clone())
    }
}

impl From<u64> for Operand {
    fn from(v: u64) -> Self {
        Operand::Literal(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoOp {
    Add,
    Multiply,
    GreaterOrEqual,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoKey {
    op: MemoOp,
    lhs: Number,
    rhs: Operand,
    when: Bool,
    pool: Option<PoolId>,
}

impl MemoKey {
    pub fn new(op: MemoOp, lhs: &Number, rhs: &Operand, when: &Bool, pool: Option<&CarryPool>) -> Self {
        MemoKey {
            op,
            lhs: lhs.clone(),
            rhs: rhs.clone(),
            when: when.clone(),
            pool: pool.map(CarryPool::id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Memoized {
    Number(Number),
    Bool(Bool),
}

#[derive(Debug, Default)]
pub struct Memo {
    entries: HashMap<MemoKey, Memoized>,
    hits: usize,
}

impl Memo {
    pub fn lookup(&mut self, key: &MemoKey) -> Option<Memoized> {
        let found = self.entries.get(key).cloned();
        if found.is_some() {
            self.hits += 1;
            debug!(op = ?key.op, width = key.lhs.width(), "memo hit");
        }
        found
    }

    pub fn store(&mut self, key: MemoKey, value: Memoized) {
        self.entries.insert(key, value);
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
