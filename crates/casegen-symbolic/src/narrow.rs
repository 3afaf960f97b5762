//! Range narrowing for one atom from the leaf comparisons that mention it.
//!
//! Each leaf is rewritten, with already-fixed atoms substituted, into the
//! linear form `k*x + c op 0` over the single remaining unknown `x`. Leaves
//! with zero or several unknowns, or with non-linear structure, say nothing
//! about `x` and are skipped.

use casegen_ir::{ArithOp, CmpOp, Rational, Sort, Term};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeSet, HashMap};

/// Values already pinned for atoms earlier in the search order.
pub type Fixed = HashMap<Term, Rational>;

/// Closed integer interval. `lo > hi` means empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub lo: i64,
    pub hi: i64,
}

/// Full signed 32-bit range, the default for every non-length atom.
pub const I32_RANGE: Interval = Interval {
    lo: i32::MIN as i64,
    hi: i32::MAX as i64,
};

impl Interval {
    pub fn new(lo: i64, hi: i64) -> Self {
        Self { lo, hi }
    }

    pub fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    pub fn contains(&self, value: i64) -> bool {
        self.lo <= value && value <= self.hi
    }

    /// Number of integers in the interval.
    pub fn width(&self) -> u128 {
        if self.is_empty() {
            0
        } else {
            (self.hi as i128 - self.lo as i128 + 1) as u128
        }
    }

    fn tighten_lo(&mut self, bound: i128) {
        if bound > self.lo as i128 {
            self.lo = i64::try_from(bound).unwrap_or(i64::MAX);
        }
    }

    fn tighten_hi(&mut self, bound: i128) {
        if bound < self.hi as i128 {
            self.hi = i64::try_from(bound).unwrap_or(i64::MIN);
        }
    }
}

/// What narrowing decided for one atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admissible {
    /// Sample from this range.
    Range(Interval),
    /// No integer value is admissible; abandon the branch.
    Empty,
    /// A real atom pinned to a non-integer, or bounded to an interval with
    /// no integer in it; let the solver choose it.
    Solver,
}

/// `k*x + c`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Linear {
    k: Rational,
    c: Rational,
}

impl Linear {
    fn constant(c: Rational) -> Self {
        Self {
            k: Rational::from_int(0),
            c,
        }
    }

    fn is_constant(&self) -> bool {
        self.k.is_zero()
    }

    fn add(self, other: Self) -> Option<Self> {
        Some(Self {
            k: self.k.checked_add(other.k)?,
            c: self.c.checked_add(other.c)?,
        })
    }

    fn neg(self) -> Option<Self> {
        Some(Self {
            k: self.k.checked_neg()?,
            c: self.c.checked_neg()?,
        })
    }

    fn scale(self, factor: Rational) -> Option<Self> {
        Some(Self {
            k: self.k.checked_mul(factor)?,
            c: self.c.checked_mul(factor)?,
        })
    }
}

/// Narrow `atom` within `base` using every leaf in `leaves`.
pub fn admissible<'a>(
    atom: &Term,
    leaves: impl IntoIterator<Item = &'a Term>,
    fixed: &Fixed,
    base: Interval,
) -> Admissible {
    let mut range = base;
    let is_real = atom.sort() == Sort::Real;

    for leaf in leaves {
        let Term::Cmp { op, lhs, rhs } = leaf else {
            continue;
        };
        let (Some(l), Some(r)) = (linear(lhs, atom, fixed), linear(rhs, atom, fixed)) else {
            continue;
        };
        let Some(diff) = r.neg().and_then(|r| l.add(r)) else {
            continue;
        };
        if diff.is_constant() {
            continue;
        }
        let Some(bound) = diff.c.checked_neg().and_then(|n| n.checked_div(diff.k)) else {
            continue;
        };
        let op = if diff.k.is_negative() { op.flipped() } else { *op };
        match op {
            CmpOp::Eq if bound.is_integer() => {
                range.tighten_lo(bound.floor());
                range.tighten_hi(bound.floor());
            }
            CmpOp::Eq if is_real => return Admissible::Solver,
            CmpOp::Eq => return Admissible::Empty,
            CmpOp::Le => range.tighten_hi(bound.floor()),
            CmpOp::Lt => range.tighten_hi(bound.ceil() - 1),
            CmpOp::Ge => range.tighten_lo(bound.ceil()),
            CmpOp::Gt => range.tighten_lo(bound.floor() + 1),
            CmpOp::Ne => {}
        }
        if range.is_empty() {
            return if is_real { Admissible::Solver } else { Admissible::Empty };
        }
    }
    Admissible::Range(range)
}

/// Linear form of `term` in `atom`, or `None` when another unknown appears
/// or the term is not linear.
fn linear(term: &Term, atom: &Term, fixed: &Fixed) -> Option<Linear> {
    if term == atom {
        return Some(Linear {
            k: Rational::from_int(1),
            c: Rational::from_int(0),
        });
    }
    if let Some(value) = fixed.get(term) {
        return Some(Linear::constant(*value));
    }
    match term {
        Term::Int(_) | Term::Real(_) => term.as_rational().map(Linear::constant),
        Term::Neg(inner) => linear(inner, atom, fixed)?.neg(),
        Term::Arith { op, lhs, rhs } => {
            let l = linear(lhs, atom, fixed)?;
            let r = linear(rhs, atom, fixed)?;
            let integer = term.sort() == Sort::Int;
            match op {
                ArithOp::Add => l.add(r),
                ArithOp::Sub => l.add(r.neg()?),
                ArithOp::Mul if l.is_constant() => r.scale(l.c),
                ArithOp::Mul if r.is_constant() => l.scale(r.c),
                ArithOp::Mul => None,
                ArithOp::Div if !r.is_constant() || r.c.is_zero() => None,
                ArithOp::Div if integer => {
                    let (a, b) = (integer_value(l)?, integer_value(r)?);
                    Some(Linear::constant(Rational::new(a.div_euclid(b), 1)?))
                }
                ArithOp::Div => l.scale(Rational::from_int(1).checked_div(r.c)?),
                ArithOp::Mod => {
                    let (a, b) = (integer_value(l)?, integer_value(r)?);
                    if b == 0 {
                        return None;
                    }
                    Some(Linear::constant(Rational::new(a.rem_euclid(b), 1)?))
                }
            }
        }
        _ => None,
    }
}

fn integer_value(form: Linear) -> Option<i128> {
    (form.is_constant() && form.c.is_integer()).then(|| form.c.numer())
}

/// Up to `count` distinct values drawn uniformly from `range`; every value
/// when the range is that small.
pub fn sample_distinct<R: Rng + ?Sized>(range: Interval, count: usize, rng: &mut R) -> Vec<i64> {
    if range.is_empty() || count == 0 {
        return Vec::new();
    }
    if range.width() <= count as u128 {
        let mut all: Vec<i64> = (range.lo..=range.hi).collect();
        all.shuffle(rng);
        return all;
    }
    let mut picked = BTreeSet::new();
    let mut order = Vec::with_capacity(count);
    while order.len() < count {
        let value = rng.gen_range(range.lo..=range.hi);
        if picked.insert(value) {
            order.push(value);
        }
    }
    order
}
