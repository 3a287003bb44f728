//! # Logic — Three-State Boolean Algebra
//!
//! Every condition in a circuit is a [`Bool`]: either a compile-time constant
//! or a symbolic [`Expr`] over cells. Constants fold away before any selector
//! text is produced, so constant-heavy expressions never reach the rule sheet.
//!
//! Symbolic values carry a *pattern*: a selector template with two kinds of
//! placeholders.
//!
//! - `$` — the own-identity marker, resolved to the consuming cell.
//! - `%N%` — a relational marker naming cell `N`.
//!
//! The target runtime can only say "a checked sibling precedes me" or "I have
//! a checked sibling after me", so [`substitute`] picks the relation by
//! comparing the consumer's allocation index with the referenced one.
//!
//! ```rust
//! use cssputer::logic::{substitute, Bool, Expr};
//!
//! let a = Bool::Expr(Expr::Cell(3));
//! let b = Bool::Expr(Expr::Cell(9));
//! let both = &a & &b;
//! assert_eq!(both.pattern().unwrap(), ":is(%3%):is(%9%)");
//! assert_eq!(
//!     substitute(&both.pattern().unwrap(), 5),
//!     ":is(:is(#i3:checked~#i5):is(#i5:has(~#i9:checked)))"
//! );
//! assert_eq!(&a & Bool::False, Bool::False);
//! ```

use std::cmp::Ordering;
use std::fmt::Write as FmtWrite;
use std::ops::{BitAnd, BitOr, BitXor, Not};

/// Allocation index of a cell. Ordering between two ids is semantically
/// load-bearing for selector synthesis.
pub type CellId = usize;

/// Symbolic boolean expression over cells.
///
/// `And` and `Or` operand lists are kept sorted and free of repeats, so
/// commuted forms of one condition compare and hash equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expr {
    /// Checked state of a cell
    Cell(CellId),
    /// Structural negation, resolved against the consumer at substitution time
    Not(Box<Expr>),
    /// Intersection of all operands
    And(Vec<Expr>),
    /// Union of all operands
    Or(Vec<Expr>),
}

impl Expr {
    fn and(self, other: Expr) -> Expr {
        let mut parts = match self {
            Expr::And(parts) => parts,
            single => vec![single],
        };
        match other {
            Expr::And(more) => parts.extend(more),
            single => parts.push(single),
        }
        parts.sort();
        parts.dedup();
        Expr::And(parts)
    }

    fn or(self, other: Expr) -> Expr {
        let mut parts = match self {
            Expr::Or(parts) => parts,
            single => vec![single],
        };
        match other {
            Expr::Or(more) => parts.extend(more),
            single => parts.push(single),
        }
        parts.sort();
        parts.dedup();
        Expr::Or(parts)
    }

    fn negate(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// Render the selector template for this expression.
    pub fn pattern(&self) -> String {
        let mut buf = String::new();
        self.write_pattern(&mut buf);
        buf
    }

    fn write_pattern(&self, buf: &mut String) {
        match self {
            Expr::Cell(id) => write!(buf, "%{}%", id).unwrap(),
            Expr::Not(inner) => {
                buf.push_str("$:not(");
                inner.write_pattern(buf);
                buf.push(')');
            }
            Expr::And(parts) => {
                for part in parts {
                    buf.push_str(":is(");
                    part.write_pattern(buf);
                    buf.push(')');
                }
            }
            Expr::Or(parts) => {
                for (idx, part) in parts.iter().enumerate() {
                    if idx > 0 {
                        buf.push(',');
                    }
                    part.write_pattern(buf);
                }
            }
        }
    }

    /// Evaluate against a cell-state lookup.
    pub fn eval<F: Fn(CellId) -> bool>(&self, state: &F) -> bool {
        match self {
            Expr::Cell(id) => state(*id),
            Expr::Not(inner) => !inner.eval(state),
            Expr::And(parts) => parts.iter().all(|p| p.eval(state)),
            Expr::Or(parts) => parts.iter().any(|p| p.eval(state)),
        }
    }

    /// Push every referenced cell id (with repeats) onto `out`.
    pub fn collect_cells(&self, out: &mut Vec<CellId>) {
        match self {
            Expr::Cell(id) => out.push(*id),
            Expr::Not(inner) => inner.collect_cells(out),
            Expr::And(parts) | Expr::Or(parts) => {
                for part in parts {
                    part.collect_cells(out);
                }
            }
        }
    }
}

/// Three-state boolean value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Bool {
    True,
    False,
    Expr(Expr),
}

impl Bool {
    pub fn constant(value: bool) -> Bool {
        if value {
            Bool::True
        } else {
            Bool::False
        }
    }

    pub fn as_const(&self) -> Option<bool> {
        match self {
            Bool::True => Some(true),
            Bool::False => Some(false),
            Bool::Expr(_) => None,
        }
    }

    /// Selector template, `None` for constants.
    pub fn pattern(&self) -> Option<String> {
        match self {
            Bool::Expr(expr) => Some(expr.pattern()),
            _ => None,
        }
    }

    pub fn eval<F: Fn(CellId) -> bool>(&self, state: &F) -> bool {
        match self {
            Bool::True => true,
            Bool::False => false,
            Bool::Expr(expr) => expr.eval(state),
        }
    }

    /// N-ary conjunction. Constants fold analytically, expressions fold into a
    /// single intersection, then the two halves combine. Empty input is `True`.
    pub fn and_<I: IntoIterator<Item = Bool>>(values: I) -> Bool {
        let (exprs, constant) = partition(values, true, |acc, v| acc && v);
        let symbolic = exprs
            .into_iter()
            .reduce(Expr::and)
            .map_or(Bool::True, Bool::Expr);
        Bool::constant(constant) & symbolic
    }

    /// N-ary disjunction. Empty input is `False`.
    pub fn or_<I: IntoIterator<Item = Bool>>(values: I) -> Bool {
        let (exprs, constant) = partition(values, false, |acc, v| acc || v);
        let symbolic = exprs
            .into_iter()
            .reduce(Expr::or)
            .map_or(Bool::False, Bool::Expr);
        Bool::constant(constant) | symbolic
    }

    /// N-ary parity. Empty input is `False`.
    pub fn xor_<I: IntoIterator<Item = Bool>>(values: I) -> Bool {
        values.into_iter().fold(Bool::False, |acc, v| acc ^ v)
    }

    pub fn xnor_<I: IntoIterator<Item = Bool>>(values: I) -> Bool {
        !Bool::xor_(values)
    }

    /// Binary equivalence.
    pub fn xnor<T: Into<Bool>>(self, other: T) -> Bool {
        match (self, other.into()) {
            (Bool::True, x) | (x, Bool::True) => x,
            (Bool::False, x) | (x, Bool::False) => !x,
            (a @ Bool::Expr(_), b @ Bool::Expr(_)) => {
                (a.clone() & b.clone()) | !(a | b)
            }
        }
    }
}

fn partition<I, F>(values: I, identity: bool, fold: F) -> (Vec<Expr>, bool)
where
    I: IntoIterator<Item = Bool>,
    F: Fn(bool, bool) -> bool,
{
    let mut exprs = Vec::new();
    let mut constant = identity;
    for value in values {
        match value {
            Bool::True => constant = fold(constant, true),
            Bool::False => constant = fold(constant, false),
            Bool::Expr(expr) => exprs.push(expr),
        }
    }
    (exprs, constant)
}

impl From<bool> for Bool {
    fn from(value: bool) -> Self {
        Bool::constant(value)
    }
}

impl From<&Bool> for Bool {
    fn from(value: &Bool) -> Self {
        value.clone()
    }
}

impl Not for Bool {
    type Output = Bool;

    fn not(self) -> Bool {
        match self {
            Bool::True => Bool::False,
            Bool::False => Bool::True,
            Bool::Expr(expr) => Bool::Expr(expr.negate()),
        }
    }
}

impl Not for &Bool {
    type Output = Bool;

    fn not(self) -> Bool {
        !self.clone()
    }
}

impl<T: Into<Bool>> BitAnd<T> for Bool {
    type Output = Bool;

    fn bitand(self, other: T) -> Bool {
        match (self, other.into()) {
            (Bool::False, _) | (_, Bool::False) => Bool::False,
            (Bool::True, x) | (x, Bool::True) => x,
            (Bool::Expr(a), Bool::Expr(b)) => Bool::Expr(a.and(b)),
        }
    }
}

impl<T: Into<Bool>> BitOr<T> for Bool {
    type Output = Bool;

    fn bitor(self, other: T) -> Bool {
        match (self, other.into()) {
            (Bool::True, _) | (_, Bool::True) => Bool::True,
            (Bool::False, x) | (x, Bool::False) => x,
            (Bool::Expr(a), Bool::Expr(b)) => Bool::Expr(a.or(b)),
        }
    }
}

impl<T: Into<Bool>> BitXor<T> for Bool {
    type Output = Bool;

    fn bitxor(self, other: T) -> Bool {
        match (self, other.into()) {
            (Bool::False, x) | (x, Bool::False) => x,
            (Bool::True, x) | (x, Bool::True) => !x,
            (a @ Bool::Expr(_), b @ Bool::Expr(_)) => {
                (a.clone() | b.clone()) & !(a & b)
            }
        }
    }
}

impl<T: Into<Bool>> BitAnd<T> for &Bool {
    type Output = Bool;

    fn bitand(self, other: T) -> Bool {
        self.clone() & other
    }
}

impl<T: Into<Bool>> BitOr<T> for &Bool {
    type Output = Bool;

    fn bitor(self, other: T) -> Bool {
        self.clone() | other
    }
}

impl<T: Into<Bool>> BitXor<T> for &Bool {
    type Output = Bool;

    fn bitxor(self, other: T) -> Bool {
        self.clone() ^ other
    }
}

/// Relational selector for `consumer` reading the checked state of `other`.
fn relation(consumer: CellId, other: CellId) -> String {
    match consumer.cmp(&other) {
        Ordering::Greater => format!("#i{}:checked~#i{}", other, consumer),
        Ordering::Less => format!("#i{}:has(~#i{}:checked)", consumer, other),
        Ordering::Equal => format!("#i{}:checked", consumer),
    }
}

/// Resolve a pattern for the cell that consumes it, wrapped in `:is(...)`.
pub fn substitute(pattern: &str, consumer: CellId) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 8);
    out.push_str(":is(");
    let mut rest = pattern;
    while let Some(pos) = rest.find(|c| c == '%' || c == '$') {
        out.push_str(&rest[..pos]);
        let marker = &rest[pos..];
        if let Some(tail) = marker.strip_prefix('$') {
            write!(&mut out, "#i{}", consumer).unwrap();
            rest = tail;
            continue;
        }
        let body = &marker[1..];
        match body.find('%').and_then(|end| {
            body[..end].parse::<CellId>().ok().map(|id| (id, end))
        }) {
            Some((other, end)) => {
                out.push_str(&relation(consumer, other));
                rest = &body[end + 1..];
            }
            None => {
                out.push('%');
                rest = body;
            }
        }
    }
    out.push_str(rest);
    out.push(')');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cell(id: CellId) -> Bool {
        Bool::Expr(Expr::Cell(id))
    }

    fn eval_with(value: &Bool, bits: &[bool]) -> bool {
        value.eval(&|id| bits[id])
    }

    #[test]
    fn constants_short_circuit() {
        let a = cell(0);
        assert_eq!(Bool::False & &a, Bool::False);
        assert_eq!(Bool::True & &a, a);
        assert_eq!(Bool::True | &a, Bool::True);
        assert_eq!(Bool::False | &a, a);
        assert_eq!(Bool::False ^ &a, a);
        assert_eq!(Bool::True ^ &a, !&a);
        assert_eq!(Bool::True.xnor(&a), a);
        assert_eq!(Bool::False.xnor(&a), !&a);
    }

    #[test]
    fn nary_partition_keeps_constants_out_of_patterns() {
        let folded = Bool::and_([cell(1), Bool::True, cell(2)]);
        assert_eq!(folded.pattern().unwrap(), ":is(%1%):is(%2%)");
        assert_eq!(Bool::and_([cell(1), Bool::False]), Bool::False);
        assert_eq!(Bool::or_([cell(1), Bool::True]), Bool::True);
        assert_eq!(Bool::or_([Bool::False, cell(4), cell(5)]).pattern().unwrap(), "%4%,%5%");
        assert_eq!(Bool::and_(Vec::new()), Bool::True);
        assert_eq!(Bool::or_(Vec::new()), Bool::False);
    }

    #[test]
    fn operand_order_does_not_change_the_condition() {
        let (a, b, c) = (cell(4), cell(1), cell(9));
        assert_eq!(&a & &b, &b & &a);
        assert_eq!(Bool::or_([a.clone(), c.clone(), b.clone()]), Bool::or_([c.clone(), b.clone(), a.clone()]));
        assert_eq!((&a & &b & &a).pattern().unwrap(), ":is(%1%):is(%4%)");
        assert_eq!((&c | &a | &c).pattern().unwrap(), "%4%,%9%");
    }

    #[test]
    fn negation_is_structural() {
        let n = !cell(7);
        assert_eq!(n.pattern().unwrap(), "$:not(%7%)");
        assert_eq!(substitute("$:not(%7%)", 9), ":is(#i9:not(#i7:checked~#i9))");
        assert_eq!(substitute("$:not(%7%)", 2), ":is(#i2:not(#i2:has(~#i7:checked)))");
    }

    #[test]
    fn relation_follows_allocation_order() {
        assert_eq!(substitute("%3%", 8), ":is(#i3:checked~#i8)");
        assert_eq!(substitute("%8%", 3), ":is(#i3:has(~#i8:checked))");
        assert_eq!(substitute("%4%", 4), ":is(#i4:checked)");
    }

    #[test]
    fn truth_tables_match_two_valued_logic() {
        let (a, b) = (cell(0), cell(1));
        for bits in [[false, false], [false, true], [true, false], [true, true]] {
            let (x, y) = (bits[0], bits[1]);
            assert_eq!(eval_with(&(&a & &b), &bits), x && y);
            assert_eq!(eval_with(&(&a | &b), &bits), x || y);
            assert_eq!(eval_with(&(&a ^ &b), &bits), x ^ y);
            assert_eq!(eval_with(&a.clone().xnor(&b), &bits), x == y);
            assert_eq!(eval_with(&!&a, &bits), !x);
        }
    }

    fn symbolic_or_const() -> impl Strategy<Value = (Option<bool>, bool)> {
        // (fixed constant, runtime value for the symbolic case)
        (prop::option::of(any::<bool>()), any::<bool>())
    }

    fn lift(id: CellId, shape: (Option<bool>, bool)) -> (Bool, bool) {
        match shape {
            (Some(c), _) => (Bool::constant(c), c),
            (None, v) => (cell(id), v),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_nary_ops_match_reference(
            shapes in prop::collection::vec(symbolic_or_const(), 1..6)
        ) {
            let lifted: Vec<(Bool, bool)> = shapes.into_iter().enumerate().map(|(i, s)| lift(i, s)).collect();
            let state: Vec<bool> = lifted.iter().map(|(_, v)| *v).collect();
            let values: Vec<Bool> = lifted.iter().map(|(b, _)| b.clone()).collect();
            let expect_and = state.iter().all(|v| *v);
            let expect_or = state.iter().any(|v| *v);
            let expect_xor = state.iter().fold(false, |acc, v| acc ^ v);
            prop_assert_eq!(eval_with(&Bool::and_(values.clone()), &state), expect_and);
            prop_assert_eq!(eval_with(&Bool::or_(values.clone()), &state), expect_or);
            prop_assert_eq!(eval_with(&Bool::xor_(values.clone()), &state), expect_xor);
            prop_assert_eq!(eval_with(&Bool::xnor_(values), &state), !expect_xor);
        }

        #[test]
        fn prop_de_morgan_and_double_negation(a in symbolic_or_const(), b in symbolic_or_const()) {
            let (x, xv) = lift(0, a);
            let (y, yv) = lift(1, b);
            let state = [xv, yv];
            prop_assert_eq!(eval_with(&!(&x & &y), &state), eval_with(&(!&x | !&y), &state));
            prop_assert_eq!(eval_with(&!(&x | &y), &state), eval_with(&(!&x & !&y), &state));
            prop_assert_eq!(eval_with(&!!x.clone(), &state), xv);
            prop_assert_eq!(eval_with(&(&x & &y), &state), eval_with(&(&y & &x), &state));
            prop_assert_eq!(eval_with(&(&x ^ &y), &state), eval_with(&(&y ^ &x), &state));
        }
    }
}
