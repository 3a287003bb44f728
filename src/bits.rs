//! Bit vectors: [`Bools`] for derived values and [`Memory`] for storage.
//!
//! Index 0 is the least-significant position. Positional operations require
//! equal widths and fail with [`CircuitError::InvalidOperand`] otherwise.

use crate::hardware::{Bit, CircuitError, Hardware};
use crate::logic::Bool;
use crate::number::Number;

/// An ordered vector of boolean values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bools {
    bools: Vec<Bool>,
}

impl Bools {
    pub fn new(bools: Vec<Bool>) -> Self {
        Bools { bools }
    }

    pub fn len(&self) -> usize {
        self.bools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bools.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Bool> {
        self.bools.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bool> {
        self.bools.iter()
    }

    pub fn as_slice(&self) -> &[Bool] {
        &self.bools
    }

    pub fn into_vec(self) -> Vec<Bool> {
        self.bools
    }

    /// Position `i` takes the value at `i + k` (toward the low end), no carry-out.
    pub fn rotate_right(&self, k: isize) -> Bools {
        let len = self.bools.len() as isize;
        if len == 0 {
            return self.clone();
        }
        Bools::new(
            (0..len)
                .map(|i| self.bools[(i + k).rem_euclid(len) as usize].clone())
                .collect(),
        )
    }

    /// Position `i` takes the value at `i - k` (toward the high end).
    pub fn rotate_left(&self, k: isize) -> Bools {
        self.rotate_right(-k)
    }

    fn check_width(&self, other: &Bools) -> Result<(), CircuitError> {
        if self.len() != other.len() {
            return Err(CircuitError::width(self.len(), other.len()));
        }
        Ok(())
    }

    fn zip_with<F>(&self, other: &Bools, op: F) -> Result<Bools, CircuitError>
    where
        F: Fn(&Bool, &Bool) -> Bool,
    {
        self.check_width(other)?;
        Ok(Bools::new(
            self.bools.iter().zip(&other.bools).map(|(a, b)| op(a, b)).collect(),
        ))
    }

    pub fn and(&self, other: &Bools) -> Result<Bools, CircuitError> {
        self.zip_with(other, |a, b| a & b)
    }

    pub fn or(&self, other: &Bools) -> Result<Bools, CircuitError> {
        self.zip_with(other, |a, b| a | b)
    }

    pub fn xor(&self, other: &Bools) -> Result<Bools, CircuitError> {
        self.zip_with(other, |a, b| a ^ b)
    }

    pub fn not(&self) -> Bools {
        Bools::new(self.bools.iter().map(|b| !b).collect())
    }

    /// All positions equal: XNOR per bit, reduced by AND.
    pub fn equals(&self, other: &Bools) -> Result<Bool, CircuitError> {
        self.check_width(other)?;
        Ok(Bool::and_(
            self.bools
                .iter()
                .zip(&other.bools)
                .map(|(a, b)| a.clone().xnor(b)),
        ))
    }

    /// Any position differs: XOR per bit, reduced by OR.
    pub fn differs(&self, other: &Bools) -> Result<Bool, CircuitError> {
        self.check_width(other)?;
        Ok(Bool::or_(
            self.bools.iter().zip(&other.bools).map(|(a, b)| a ^ b),
        ))
    }

    pub fn reversed(&self) -> Bools {
        Bools::new(self.bools.iter().rev().cloned().collect())
    }

    /// Copy into freshly allocated storage.
    pub fn stage(&self, hw: &mut Hardware) -> Result<Memory, CircuitError> {
        if self.bools.is_empty() {
            return Err(CircuitError::InvalidOperand {
                expected: "non-empty vector".into(),
                got: "empty vector".into(),
            });
        }
        let memory = hw.alloc(self.bools.len());
        memory.assign(hw, self, Bool::True)?;
        Ok(memory)
    }
}

impl std::ops::Index<usize> for Bools {
    type Output = Bool;

    fn index(&self, idx: usize) -> &Bool {
        &self.bools[idx]
    }
}

impl From<Vec<Bool>> for Bools {
    fn from(bools: Vec<Bool>) -> Self {
        Bools::new(bools)
    }
}

/// Assignable storage: a vector of cells.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Memory {
    bits: Vec<Bit>,
}

impl Memory {
    pub fn from_bits(bits: Vec<Bit>) -> Self {
        Memory { bits }
    }

    /// Allocate `width` cells holding `value` (masked to the width).
    pub fn with_value(hw: &mut Hardware, width: usize, value: u64) -> Self {
        hw.constant(&int_to_bin(value, width))
    }

    pub fn bits(&self) -> &[Bit] {
        &self.bits
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn to_bools(&self) -> Bools {
        Bools::new(self.bits.iter().map(|b| Bool::from(*b)).collect())
    }

    pub fn number(&self) -> Number {
        Number::from_bools(self.to_bools())
    }

    /// Install per-position drive rules: while `when` holds, each cell follows
    /// the matching position of `value`. Rules accumulate across calls.
    pub fn assign<W: Into<Bool>>(
        &self,
        hw: &mut Hardware,
        value: &Bools,
        when: W,
    ) -> Result<(), CircuitError> {
        if value.len() != self.bits.len() {
            return Err(CircuitError::width(self.bits.len(), value.len()));
        }
        let when = when.into();
        for (bit, source) in self.bits.iter().zip(value.iter()) {
            bit.iff_when(hw, source, &when);
        }
        Ok(())
    }

    pub fn reversed(&self) -> Memory {
        Memory::from_bits(self.bits.iter().rev().copied().collect())
    }

    pub fn label(&self, hw: &mut Hardware, name: &str) {
        hw.label(&self.bits, name);
    }

    pub fn merge<'a, I: IntoIterator<Item = &'a Memory>>(pieces: I) -> Memory {
        Memory::from_bits(pieces.into_iter().flat_map(|m| m.bits.iter().copied()).collect())
    }
}

impl std::ops::Index<usize> for Memory {
    type Output = Bit;

    fn index(&self, idx: usize) -> &Bit {
        &self.bits[idx]
    }
}

/// Little-endian bit expansion of `value` over `width` positions.
pub fn int_to_bin(value: u64, width: usize) -> Vec<bool> {
    (0..width)
        .map(|i| i < 64 && (value >> i) & 1 == 1)
        .collect()
}
