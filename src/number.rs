//! # Number — Arithmetic Vectors
//!
//! A [`Number`] is an unsigned little-endian vector of [`Bool`]s. Comparison
//! against literals folds to pure expressions; addition, multiplication and
//! magnitude comparison generate ripple networks whose intermediate carries
//! are staged through cells, either freshly allocated or drawn from a shared
//! [`CarryPool`].
//!
//! All arithmetic wraps modulo `2^width` and carries no overflow flag.
//!
//! ```rust
//! use cssputer::{Bool, Hardware, Memory, Simulator};
//!
//! let mut hw = Hardware::new();
//! let a = Memory::with_value(&mut hw, 4, 3);
//! let b = Memory::with_value(&mut hw, 4, 5);
//! let sum = a.number().add(&mut hw, &b.number(), Bool::True, None).unwrap();
//! hw.finish().unwrap();
//!
//! let mut sim = Simulator::new(&hw);
//! sim.settle(1_000).unwrap();
//! assert_eq!(sim.eval_number(&sum), 8);
//! ```

use crate::bits::{int_to_bin, Bools, Memory};
use crate::hardware::{Bit, CarryPool, CircuitError, Hardware};
use crate::logic::Bool;
use crate::memo::{MemoKey, MemoOp, Memoized, Operand};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Number {
    bools: Bools,
}

impl Number {
    pub fn from_bools<B: Into<Bools>>(bools: B) -> Self {
        Number {
            bools: bools.into(),
        }
    }

    pub fn zero(width: usize) -> Self {
        Number::constant(0, width)
    }

    /// Literal value folded to constants (no cells).
    pub fn constant(value: u64, width: usize) -> Self {
        Number::from_bools(
            int_to_bin(value, width)
                .into_iter()
                .map(Bool::constant)
                .collect::<Vec<_>>(),
        )
    }

    pub fn width(&self) -> usize {
        self.bools.len()
    }

    pub fn bools(&self) -> &Bools {
        &self.bools
    }

    pub fn into_bools(self) -> Bools {
        self.bools
    }

    fn check_width(&self, other: &Number) -> Result<(), CircuitError> {
        if self.width() != other.width() {
            return Err(CircuitError::width(self.width(), other.width()));
        }
        Ok(())
    }

    pub fn eq_const(&self, value: u64) -> Bool {
        Bool::and_(
            int_to_bin(value, self.width())
                .into_iter()
                .zip(self.bools.iter())
                .map(|(target, bit)| if target { bit.clone() } else { !bit }),
        )
    }

    pub fn ne_const(&self, value: u64) -> Bool {
        Bool::or_(
            int_to_bin(value, self.width())
                .into_iter()
                .zip(self.bools.iter())
                .map(|(target, bit)| if target { !bit } else { bit.clone() }),
        )
    }

    pub fn equals(&self, other: &Number) -> Result<Bool, CircuitError> {
        self.bools.equals(&other.bools)
    }

    pub fn differs(&self, other: &Number) -> Result<Bool, CircuitError> {
        self.bools.differs(&other.bools)
    }

    /// Highest `n` positions.
    pub fn upper(&self, n: usize) -> Number {
        let n = n.min(self.width());
        Number::from_bools(self.bools.as_slice()[self.width() - n..].to_vec())
    }

    /// Lowest `n` positions.
    pub fn lower(&self, n: usize) -> Number {
        let n = n.min(self.width());
        Number::from_bools(self.bools.as_slice()[..n].to_vec())
    }

    /// Everything above the lowest `n` positions.
    pub fn skip(&self, n: usize) -> Number {
        self.upper(self.width().saturating_sub(n))
    }

    pub fn pad_top(&self, size: usize, fill: bool) -> Number {
        let mut bools = self.bools.as_slice().to_vec();
        bools.resize(size.max(bools.len()), Bool::constant(fill));
        Number::from_bools(bools)
    }

    pub fn pad_bottom(&self, size: usize, fill: bool) -> Number {
        let pad = size.saturating_sub(self.width());
        let mut bools = vec![Bool::constant(fill); pad];
        bools.extend(self.bools.iter().cloned());
        Number::from_bools(bools)
    }

    /// Multiply by `2^amount`, dropping bits shifted past the top.
    pub fn left_shift_nowrap(&self, amount: usize) -> Number {
        self.lower(self.width().saturating_sub(amount))
            .pad_bottom(self.width(), false)
    }

    pub fn right_shift_nowrap(&self, amount: usize) -> Number {
        self.upper(self.width().saturating_sub(amount))
            .pad_top(self.width(), false)
    }

    pub fn rotate_left(&self, k: isize) -> Number {
        Number::from_bools(self.bools.rotate_left(k))
    }

    pub fn rotate_right(&self, k: isize) -> Number {
        Number::from_bools(self.bools.rotate_right(k))
    }

    pub fn reversed(&self) -> Number {
        Number::from_bools(self.bools.reversed())
    }

    pub fn is_truthy(&self) -> Bool {
        Bool::or_(self.bools.iter().cloned())
    }

    /// Mask every position with a single condition.
    pub fn and_bool(&self, mask: &Bool) -> Number {
        self.broadcast(mask, |b, m| b & m)
    }

    /// Raise every position while `flag` holds.
    pub fn or_bool(&self, flag: &Bool) -> Number {
        self.broadcast(flag, |b, f| b | f)
    }

    /// Invert every position while `flag` holds.
    pub fn xor_bool(&self, flag: &Bool) -> Number {
        self.broadcast(flag, |b, f| b ^ f)
    }

    fn broadcast<F: Fn(&Bool, &Bool) -> Bool>(&self, value: &Bool, op: F) -> Number {
        Number::from_bools(self.bools.iter().map(|b| op(b, value)).collect::<Vec<_>>())
    }

    pub fn and(&self, other: &Number) -> Result<Number, CircuitError> {
        self.bools.and(&other.bools).map(Number::from_bools)
    }

    pub fn or(&self, other: &Number) -> Result<Number, CircuitError> {
        self.bools.or(&other.bools).map(Number::from_bools)
    }

    pub fn xor(&self, other: &Number) -> Result<Number, CircuitError> {
        self.bools.xor(&other.bools).map(Number::from_bools)
    }

    pub fn not(&self) -> Number {
        Number::from_bools(self.bools.not())
    }

    pub fn and_const(&self, value: u64) -> Number {
        self.zip_const(value, |a, b| a & b)
    }

    pub fn or_const(&self, value: u64) -> Number {
        self.zip_const(value, |a, b| a | b)
    }

    pub fn xor_const(&self, value: u64) -> Number {
        self.zip_const(value, |a, b| a ^ b)
    }

    fn zip_const<F: Fn(&Bool, bool) -> Bool>(&self, value: u64, op: F) -> Number {
        Number::from_bools(
            self.bools
                .iter()
                .zip(int_to_bin(value, self.width()))
                .map(|(a, b)| op(a, b))
                .collect::<Vec<_>>(),
        )
    }

    /// Positionwise OR across any number of equal-width numbers.
    pub fn or_all<I: IntoIterator<Item = Number>>(values: I) -> Result<Number, CircuitError> {
        Number::fold_all(values, Number::or)
    }

    pub fn and_all<I: IntoIterator<Item = Number>>(values: I) -> Result<Number, CircuitError> {
        Number::fold_all(values, Number::and)
    }

    pub fn xor_all<I: IntoIterator<Item = Number>>(values: I) -> Result<Number, CircuitError> {
        Number::fold_all(values, Number::xor)
    }

    fn fold_all<I, F>(values: I, op: F) -> Result<Number, CircuitError>
    where
        I: IntoIterator<Item = Number>,
        F: Fn(&Number, &Number) -> Result<Number, CircuitError>,
    {
        let mut iter = values.into_iter();
        let first = iter.next().ok_or_else(|| CircuitError::InvalidOperand {
            expected: "at least one number".into(),
            got: "none".into(),
        })?;
        iter.try_fold(first, |acc, n| op(&acc, &n))
    }

    /// Copy into freshly allocated storage.
    pub fn stage(&self, hw: &mut Hardware) -> Result<Memory, CircuitError> {
        self.bools.stage(hw)
    }

    fn draw_carries(
        hw: &mut Hardware,
        needed: usize,
        pool: Option<&CarryPool>,
    ) -> Result<Vec<Bit>, CircuitError> {
        match pool {
            Some(pool) => pool.draw(needed),
            None => Ok(hw.alloc(needed).bits().to_vec()),
        }
    }

    /// Ripple-carry addition. The first carry stays an expression; every
    /// later one is staged into a cell while `when` holds.
    pub fn add<O: Into<Operand>, W: Into<Bool>>(
        &self,
        hw: &mut Hardware,
        other: O,
        when: W,
        pool: Option<&CarryPool>,
    ) -> Result<Number, CircuitError> {
        let other = other.into();
        let when = when.into();
        if let Operand::Number(n) = &other {
            self.check_width(n)?;
        }
        let key = MemoKey::new(MemoOp::Add, self, &other, &when, pool);
        if let Some(Memoized::Number(hit)) = hw.memo.lookup(&key) {
            return Ok(hit);
        }
        let needed = self.add_carries_needed(&other);
        let mut carries = Self::draw_carries(hw, needed, pool)?;
        let result = self.add_with(hw, &other, &when, &mut carries)?;
        hw.memo.store(key, Memoized::Number(result.clone()));
        Ok(result)
    }

    fn add_carries_needed(&self, other: &Operand) -> usize {
        let first_active = match other {
            Operand::Number(_) => Some(0),
            Operand::Literal(value) => int_to_bin(*value, self.width()).iter().position(|b| *b),
        };
        first_active.map_or(0, |f| self.width().saturating_sub(f + 2))
    }

    fn add_with(
        &self,
        hw: &mut Hardware,
        other: &Operand,
        when: &Bool,
        carries: &mut Vec<Bit>,
    ) -> Result<Number, CircuitError> {
        let width = self.width();
        let mut result = Vec::with_capacity(width);
        let mut carry: Option<Bool> = None;
        let mut stage_next = false;
        let rhs: Vec<Bool> = match other {
            Operand::Number(n) => n.bools.as_slice().to_vec(),
            Operand::Literal(value) => Number::constant(*value, width).into_bools().into_vec(),
        };
        let literal = matches!(other, Operand::Literal(_));
        for (a, b) in self.bools.iter().zip(rhs) {
            if stage_next {
                if let Some(expr) = carry.take() {
                    let cell = carries.pop().ok_or(CircuitError::CarryPoolExhausted {
                        needed: 1,
                        available: 0,
                    })?;
                    cell.iff_when(hw, expr, when);
                    carry = Some(cell.into());
                }
            }
            match (carry.take(), literal) {
                (None, false) => {
                    result.push(a ^ &b);
                    carry = Some(a & &b);
                }
                (None, true) => {
                    // Nothing to carry until the literal's first set bit.
                    if b == Bool::True {
                        result.push(!a);
                        carry = Some(a.clone());
                    } else {
                        result.push(a.clone());
                    }
                }
                (Some(c), false) => {
                    result.push(Bool::xor_([a.clone(), b.clone(), c.clone()]));
                    carry = Some((a & &b) | (c & (a | &b)));
                    stage_next = true;
                }
                (Some(c), true) => {
                    if b == Bool::True {
                        result.push(a.clone().xnor(&c));
                        carry = Some(a | c);
                    } else {
                        result.push(a ^ &c);
                        carry = Some(a & c);
                    }
                    stage_next = true;
                }
            }
        }
        Ok(Number::from_bools(result))
    }

    /// Shift-and-add multiplication with a bypass for operands in {0, 1}.
    ///
    /// The bypass is a disjunction gate, not control flow: the general
    /// network is still built, but only enabled when either operand has a bit
    /// set above bit 0.
    pub fn multiply<W: Into<Bool>>(
        &self,
        hw: &mut Hardware,
        other: &Number,
        when: W,
        pool: Option<&CarryPool>,
    ) -> Result<Number, CircuitError> {
        self.check_width(other)?;
        let when = when.into();
        let key = MemoKey::new(MemoOp::Multiply, self, &Operand::from(other), &when, pool);
        if let Some(Memoized::Number(hit)) = hw.memo.lookup(&key) {
            return Ok(hit);
        }
        let not_special = self.skip(1).is_truthy() | other.skip(1).is_truthy();
        let general = self
            .multiply_general(hw, other, &when & &not_special, pool)?
            .and_bool(&not_special);
        let result = Number::or_all([
            other.and_bool(&self.eq_const(1)),
            self.and_bool(&other.eq_const(1)),
            general,
        ])?;
        hw.memo.store(key, Memoized::Number(result.clone()));
        Ok(result)
    }

    fn multiply_carries_needed(&self) -> usize {
        let w = self.width();
        // one staging vector plus one adder chain per partial product after the first
        w.saturating_sub(1) * (w + w.saturating_sub(2))
    }

    /// The full shift-and-add network, without the {0, 1} bypass.
    pub fn multiply_general<W: Into<Bool>>(
        &self,
        hw: &mut Hardware,
        other: &Number,
        when: W,
        pool: Option<&CarryPool>,
    ) -> Result<Number, CircuitError> {
        self.check_width(other)?;
        let when = when.into();
        let width = self.width();
        let mut carries = Self::draw_carries(hw, self.multiply_carries_needed(), pool)?;
        let mut result: Option<Number> = None;
        for i in 0..width {
            let addend = self.left_shift_nowrap(i).and_bool(&other.bools[i]);
            result = Some(match result {
                None => addend,
                Some(acc) => {
                    if carries.len() < width {
                        return Err(CircuitError::CarryPoolExhausted {
                            needed: width,
                            available: carries.len(),
                        });
                    }
                    let stage = Memory::from_bits(carries.split_off(carries.len() - width));
                    let sum = acc.add_with(hw, &Operand::Number(addend), &when, &mut carries)?;
                    stage.assign(hw, &sum.bools, &when)?;
                    stage.number()
                }
            });
        }
        Ok(result.unwrap_or_else(|| Number::zero(width)))
    }

    /// Bit-serial magnitude comparison `self >= other`, most significant bit
    /// first, with the running "greater so far" signal staged per boundary.
    pub fn greater_or_equal<W: Into<Bool>>(
        &self,
        hw: &mut Hardware,
        other: &Number,
        when: W,
        pool: Option<&CarryPool>,
    ) -> Result<Bool, CircuitError> {
        self.check_width(other)?;
        let when = when.into();
        let key = MemoKey::new(MemoOp::GreaterOrEqual, self, &Operand::from(other), &when, pool);
        if let Some(Memoized::Bool(hit)) = hw.memo.lookup(&key) {
            return Ok(hit);
        }
        let mut carries = Self::draw_carries(hw, self.width().saturating_sub(1), pool)?;
        let mut greater_yet = Bool::False;
        let mut is_lesses = Vec::with_capacity(self.width());
        let mut greater_yets = Vec::with_capacity(self.width());
        for (idx, (a, b)) in self.bools.iter().zip(other.bools.iter()).rev().enumerate() {
            if idx > 0 {
                let cell = carries.pop().ok_or(CircuitError::CarryPoolExhausted {
                    needed: 1,
                    available: 0,
                })?;
                cell.iff_when(hw, &greater_yet, &when);
                greater_yets.push(Bool::from(cell));
                greater_yet = cell.into();
            }
            is_lesses.push(b & !a);
            greater_yet = greater_yet | (a & !b);
        }
        greater_yets.push(greater_yet);
        let result = Bool::and_(
            is_lesses
                .into_iter()
                .zip(greater_yets)
                .map(|(is_less, greater)| !is_less | greater),
        );
        hw.memo.store(key, Memoized::Bool(result.clone()));
        Ok(result)
    }
}

impl std::ops::Index<usize> for Number {
    type Output = Bool;

    fn index(&self, idx: usize) -> &Bool {
        &self.bools[idx]
    }
}

impl From<&Memory> for Number {
    fn from(memory: &Memory) -> Self {
        memory.number()
    }
}
