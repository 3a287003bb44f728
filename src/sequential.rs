//! # Sequential — State-Holding Primitives
//!
//! These primitives need feedback, so they follow a two-pass protocol:
//! callers register conditions during construction and a finisher wires the
//! combined condition once [`Hardware::finish`] runs.
//!
//! - [`Edged`] — rising/falling edge detection
//! - [`Counter`] — self-incrementing register with a shadow next-value
//! - [`OneHot`] — decoder from a binary source
//! - [`Array`] — addressable rows with shared read/write ports
//! - [`PhaseRing`] — twisted ring sequencing multi-step operations

use crate::bits::{int_to_bin, Memory};
use crate::hardware::{Bit, CircuitError, Hardware};
use crate::logic::Bool;
use crate::number::Number;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

type Conditions = Rc<RefCell<Vec<Bool>>>;

/// Two cells one propagation step apart.
#[derive(Debug, Clone)]
pub struct Edged {
    last: Bit,
    now: Bit,
}

impl Edged {
    pub fn new<W: Into<Bool>>(hw: &mut Hardware, watched: W) -> Self {
        let last = hw.bit(false);
        let now = hw.bit(false);
        last.iff(hw, now);
        now.iff(hw, watched);
        Edged { last, now }
    }

    pub fn rising(&self) -> Bool {
        self.now & !self.last
    }

    pub fn falling(&self) -> Bool {
        self.last & !self.now
    }
}

/// A register that increments whenever any registered condition holds.
///
/// The shadow vector is allocated after the value and in reverse bit order,
/// so the next-state rules always read cells allocated before them.
#[derive(Debug, Clone)]
pub struct Counter {
    value: Memory,
    next: Memory,
    advance: Conditions,
}

impl Counter {
    pub fn new(hw: &mut Hardware, width: usize, initial: u64) -> Result<Self, CircuitError> {
        if width == 0 {
            return Err(CircuitError::InvalidOperand {
                expected: "counter of at least 1 bit".into(),
                got: "0 bits".into(),
            });
        }
        let value = Memory::with_value(hw, width, initial);
        let next = hw.alloc(width).reversed();
        let advance: Conditions = Rc::default();
        let counter = Counter {
            value,
            next,
            advance,
        };
        let wiring = counter.clone();
        hw.register_finisher(move |hw| wiring.finish(hw));
        Ok(counter)
    }

    fn finish(&self, hw: &mut Hardware) -> Result<(), CircuitError> {
        let conditions = self.advance.borrow();
        if conditions.is_empty() {
            return Ok(());
        }
        let when = Bool::or_(conditions.iter().cloned());
        self.value.assign(hw, &self.next.to_bools(), &when)?;
        let idle = !&when;
        self.next[0].iff_when(hw, !self.value[0], &idle);
        for i in 1..self.value.len() {
            let carry_in = self.value[i - 1] & !self.next[i - 1];
            self.next[i].iff_when(hw, carry_in ^ self.value[i], &idle);
        }
        debug!(width = self.value.len(), sites = conditions.len(), "wired counter");
        Ok(())
    }

    /// Advance by one whenever `when` holds.
    pub fn count<W: Into<Bool>>(&self, when: W) {
        let when = when.into();
        let mut conditions = self.advance.borrow_mut();
        if !conditions.contains(&when) {
            conditions.push(when);
        }
    }

    pub fn value(&self) -> &Memory {
        &self.value
    }

    pub fn number(&self) -> Number {
        self.value.number()
    }

    pub fn label(&self, hw: &mut Hardware, name: &str) {
        self.value.label(hw, name);
    }
}

/// One cell per option; exactly the cell matching the source is set.
#[derive(Debug, Clone)]
pub struct OneHot {
    bits: Memory,
}

impl OneHot {
    pub fn new(hw: &mut Hardware, options: usize) -> Self {
        OneHot {
            bits: hw.alloc(options),
        }
    }

    pub fn options(&self) -> usize {
        self.bits.len()
    }

    /// Decode `source` while `when` holds.
    pub fn set_source<W: Into<Bool>>(&self, hw: &mut Hardware, source: &Number, when: W) {
        let when = when.into();
        for (i, bit) in self.bits.bits().iter().enumerate() {
            bit.iff_when(hw, source.eq_const(i as u64), &when);
        }
    }

    pub fn get(&self, option: usize) -> Option<Bit> {
        self.bits.bits().get(option).copied()
    }

    pub fn bits(&self) -> &Memory {
        &self.bits
    }

    pub fn label(&self, hw: &mut Hardware, name: &str) {
        self.bits.label(hw, name);
    }
}

impl std::ops::Index<usize> for OneHot {
    type Output = Bit;

    fn index(&self, option: usize) -> &Bit {
        &self.bits[option]
    }
}

/// Fixed-size table of rows sharing one address, one input and one output.
///
/// Reads are combinational: the output follows whichever row the one-hot
/// address selects. A row latches the input while it is selected and the
/// write-enable, the OR of every write site, is active.
#[derive(Debug, Clone)]
pub struct Array {
    out: Memory,
    rows: Vec<Memory>,
    write_mode: Bit,
    writes: Conditions,
    input: Memory,
    marker: OneHot,
    index: Memory,
}

impl Array {
    pub fn new(
        hw: &mut Hardware,
        size: usize,
        elem_bits: usize,
        index_bits: usize,
        initial: &[u64],
    ) -> Result<Self, CircuitError> {
        if initial.len() > size {
            return Err(CircuitError::CapacityExceeded {
                image: initial.len(),
                capacity: size,
            });
        }
        if index_bits < usize::BITS as usize && size > 1usize << index_bits {
            return Err(CircuitError::CapacityExceeded {
                image: size,
                capacity: 1usize << index_bits,
            });
        }
        let out = hw.alloc(elem_bits);
        let rows: Vec<Memory> = (0..size)
            .map(|i| match initial.get(i) {
                Some(value) => hw.constant(&int_to_bin(*value, elem_bits)),
                None => hw.alloc(elem_bits),
            })
            .collect();
        let write_mode = hw.bit(false);
        let input = hw.alloc(elem_bits);
        let marker = OneHot::new(hw, size);
        let index = hw.alloc(index_bits);
        marker.set_source(hw, &index.number(), Bool::True);

        let input_bools = input.to_bools();
        for (i, row) in rows.iter().enumerate() {
            row.assign(hw, &input_bools, marker[i] & write_mode)?;
            out.assign(hw, &row.to_bools(), marker[i])?;
        }

        let array = Array {
            out,
            rows,
            write_mode,
            writes: Rc::default(),
            input,
            marker,
            index,
        };
        let wiring = array.clone();
        hw.register_finisher(move |hw| wiring.finish(hw));
        debug!(size, elem_bits, preset = initial.len(), "built array");
        Ok(array)
    }

    fn finish(&self, hw: &mut Hardware) -> Result<(), CircuitError> {
        let writes = self.writes.borrow();
        if !writes.is_empty() {
            self.write_mode.iff(hw, Bool::or_(writes.iter().cloned()));
        }
        Ok(())
    }

    /// Point the shared address at `index` while `when` holds and return the
    /// shared output.
    pub fn get<W: Into<Bool>>(
        &self,
        hw: &mut Hardware,
        index: &Number,
        when: W,
    ) -> Result<Number, CircuitError> {
        self.index.assign(hw, index.bools(), when)?;
        Ok(self.out.number())
    }

    /// Write `value` at `index` while `when` holds.
    pub fn set<W: Into<Bool>>(
        &self,
        hw: &mut Hardware,
        index: &Number,
        value: &Number,
        when: W,
    ) -> Result<(), CircuitError> {
        if value.width() != self.input.len() {
            return Err(CircuitError::width(self.input.len(), value.width()));
        }
        let when = when.into();
        self.index.assign(hw, index.bools(), &when)?;
        self.input.assign(hw, value.bools(), &when)?;
        self.writes.borrow_mut().push(when);
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, idx: usize) -> Option<&Memory> {
        self.rows.get(idx)
    }

    pub fn rows(&self) -> &[Memory] {
        &self.rows
    }

    pub fn index(&self) -> &Memory {
        &self.index
    }

    pub fn input(&self) -> &Memory {
        &self.input
    }

    pub fn output(&self) -> &Memory {
        &self.out
    }
}

/// Twisted ring of `n` cells: cell 0 follows the complement of the last
/// cell, every other cell follows its predecessor.
///
/// One lap takes `2n` flips. During the first `n` flips the ring fills with
/// ones and exactly one position is active after each flip, visiting
/// `0..n` in order. During the next `n` flips it drains back to zeros and
/// no position is active, so `exactly` and `at_least` are false for that
/// whole half.
#[derive(Debug, Clone)]
pub struct PhaseRing {
    bits: Memory,
}

impl PhaseRing {
    pub fn new(hw: &mut Hardware, n: usize) -> Result<Self, CircuitError> {
        if n < 2 {
            return Err(CircuitError::InvalidOperand {
                expected: "ring of at least 2 cells".into(),
                got: format!("{} cells", n),
            });
        }
        let bits = hw.alloc(n);
        bits[0].iff(hw, !bits[n - 1]);
        for i in 1..n {
            bits[i].iff(hw, bits[i - 1]);
        }
        Ok(PhaseRing { bits })
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    fn position(&self, n: usize) -> Result<Bit, CircuitError> {
        self.bits.bits().get(n).copied().ok_or_else(|| CircuitError::InvalidOperand {
            expected: format!("phase below {}", self.len()),
            got: format!("phase {}", n),
        })
    }

    /// Phase `n` or any later phase of the current lap.
    pub fn at_least(&self, n: usize) -> Result<Bool, CircuitError> {
        Ok(self.position(n)? & self.bits[0])
    }

    /// Exactly phase `n`.
    pub fn exactly(&self, n: usize) -> Result<Bool, CircuitError> {
        let here = self.position(n)?;
        if n == self.len() - 1 {
            return Ok(here & self.bits[0]);
        }
        Ok(here & !self.bits[n + 1])
    }

    pub fn bits(&self) -> &Memory {
        &self.bits
    }

    pub fn label(&self, hw: &mut Hardware, name: &str) {
        self.bits.label(hw, name);
    }
}
