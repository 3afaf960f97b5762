//! Solver-independent term IR.
//!
//! Terms are plain trees with structural `Hash`/`Eq`, so they double as
//! keys for the atomic value table.

use std::fmt;

/// Sort of a term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sort {
    Bool,
    Int,
    Real,
    /// Record sort, named by its blueprint.
    Struct(String),
    /// Unbounded sequence (pointers, struct member arrays).
    Seq(Box<Sort>),
    /// Int-indexed array (fixed-size top-level arrays).
    Array(Box<Sort>),
    /// An unapplied constraint primitive.
    Primitive,
}

impl Sort {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Sort::Int | Sort::Real)
    }

    /// Element sort of an array or sequence.
    pub fn element(&self) -> Option<&Sort> {
        match self {
            Sort::Seq(inner) | Sort::Array(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::Int => write!(f, "Int"),
            Sort::Real => write!(f, "Real"),
            Sort::Struct(name) => write!(f, "{name}"),
            Sort::Seq(inner) => write!(f, "Seq[{inner}]"),
            Sort::Array(inner) => write!(f, "Array[Int -> {inner}]"),
            Sort::Primitive => write!(f, "<primitive>"),
        }
    }
}

/// Exact rational with a positive denominator in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i128,
    den: i128,
}

impl Rational {
    /// Build `num / den`. Returns `None` when `den` is zero.
    pub fn new(num: i128, den: i128) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let sign = if den < 0 { -1 } else { 1 };
        let g = gcd(num.unsigned_abs(), den.unsigned_abs()).max(1) as i128;
        Some(Self {
            num: sign * num / g,
            den: sign * den / g,
        })
    }

    pub fn from_int(n: i64) -> Self {
        Self {
            num: n as i128,
            den: 1,
        }
    }

    /// Fixed-precision approximation: `round(x * scale) / scale`.
    pub fn approximate(x: f64, scale: i64) -> Option<Self> {
        let scaled = (x * scale as f64).round();
        if !scaled.is_finite() || scaled.abs() >= i128::MAX as f64 {
            return None;
        }
        Self::new(scaled as i128, scale as i128)
    }

    pub fn numer(&self) -> i128 {
        self.num
    }

    pub fn denom(&self) -> i128 {
        self.den
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub fn is_integer(&self) -> bool {
        self.den == 1
    }

    pub fn is_negative(&self) -> bool {
        self.num < 0
    }

    pub fn floor(&self) -> i128 {
        self.num.div_euclid(self.den)
    }

    pub fn ceil(&self) -> i128 {
        -(-self.num).div_euclid(self.den)
    }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        let num = self
            .num
            .checked_mul(other.den)?
            .checked_add(other.num.checked_mul(self.den)?)?;
        Self::new(num, self.den.checked_mul(other.den)?)
    }

    pub fn checked_mul(self, other: Self) -> Option<Self> {
        Self::new(
            self.num.checked_mul(other.num)?,
            self.den.checked_mul(other.den)?,
        )
    }

    pub fn checked_div(self, other: Self) -> Option<Self> {
        Self::new(
            self.num.checked_mul(other.den)?,
            self.den.checked_mul(other.num)?,
        )
    }

    pub fn checked_neg(self) -> Option<Self> {
        Some(Self {
            num: self.num.checked_neg()?,
            den: self.den,
        })
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.checked_add(other.checked_neg()?)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// The two callable constraint primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Length,
    Gaussian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    /// The operator with its operands swapped: `a < b` is `b > a`.
    pub fn flipped(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ne => CmpOp::Ne,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
        }
    }
}

/// A compiled term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Bool(bool),
    Int(i64),
    Real(Rational),
    /// A declared global variable.
    Var { name: String, sort: Sort },
    /// An unapplied primitive identifier.
    Primitive(Primitive),
    /// Result of a `GAUSSIAN(...)` statement; never asserted.
    GaussianSentinel,
    /// Element of an int-indexed array.
    Select { array: Box<Term>, index: Box<Term> },
    /// Element of a sequence.
    Nth { seq: Box<Term>, index: Box<Term> },
    /// Length of a sequence.
    Length(Box<Term>),
    /// Projection of a record member.
    Field {
        base: Box<Term>,
        blueprint: String,
        index: usize,
        field: String,
        sort: Sort,
    },
    Neg(Box<Term>),
    Arith {
        op: ArithOp,
        lhs: Box<Term>,
        rhs: Box<Term>,
    },
    Cmp {
        op: CmpOp,
        lhs: Box<Term>,
        rhs: Box<Term>,
    },
    Not(Box<Term>),
    And(Vec<Term>),
    Or(Vec<Term>),
    Implies(Box<Term>, Box<Term>),
    Ite {
        cond: Box<Term>,
        then_term: Box<Term>,
        else_term: Box<Term>,
    },
}

impl Term {
    pub fn arith(op: ArithOp, lhs: Term, rhs: Term) -> Term {
        Term::Arith {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn cmp(op: CmpOp, lhs: Term, rhs: Term) -> Term {
        Term::Cmp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn not(term: Term) -> Term {
        Term::Not(Box::new(term))
    }

    pub fn implies(lhs: Term, rhs: Term) -> Term {
        Term::Implies(Box::new(lhs), Box::new(rhs))
    }

    /// Is this an integer or real literal?
    pub fn is_numeral(&self) -> bool {
        matches!(self, Term::Int(_) | Term::Real(_))
    }

    /// Literal value as a rational, if this is a numeral.
    pub fn as_rational(&self) -> Option<Rational> {
        match self {
            Term::Int(n) => Some(Rational::from_int(*n)),
            Term::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Sequence-length terms are sampled from a small positive range.
    pub fn is_length(&self) -> bool {
        matches!(self, Term::Length(_))
    }

    pub fn sort(&self) -> Sort {
        match self {
            Term::Bool(_)
            | Term::GaussianSentinel
            | Term::Cmp { .. }
            | Term::Not(_)
            | Term::And(_)
            | Term::Or(_)
            | Term::Implies(..) => Sort::Bool,
            Term::Int(_) | Term::Length(_) => Sort::Int,
            Term::Real(_) => Sort::Real,
            Term::Var { sort, .. } | Term::Field { sort, .. } => sort.clone(),
            Term::Primitive(_) => Sort::Primitive,
            Term::Select { array: inner, .. } | Term::Nth { seq: inner, .. } => {
                inner.sort().element().cloned().unwrap_or(Sort::Int)
            }
            Term::Neg(inner) => inner.sort(),
            Term::Arith { lhs, rhs, .. } => numeric_join(&lhs.sort(), &rhs.sort()),
            Term::Ite {
                then_term,
                else_term,
                ..
            } => {
                let t = then_term.sort();
                if t.is_numeric() {
                    numeric_join(&t, &else_term.sort())
                } else {
                    t
                }
            }
        }
    }
}

/// Int op Int stays Int; anything involving Real is Real.
pub fn numeric_join(a: &Sort, b: &Sort) -> Sort {
    if *a == Sort::Int && *b == Sort::Int {
        Sort::Int
    } else {
        Sort::Real
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Bool(b) => write!(f, "{b}"),
            Term::Int(n) => write!(f, "{n}"),
            Term::Real(r) => write!(f, "{r}"),
            Term::Var { name, .. } => write!(f, "{name}"),
            Term::Primitive(Primitive::Length) => write!(f, "_LENGTH"),
            Term::Primitive(Primitive::Gaussian) => write!(f, "GAUSSIAN"),
            Term::GaussianSentinel => write!(f, "<gaussian>"),
            Term::Select { array, index } => write!(f, "{array}[{index}]"),
            Term::Nth { seq, index } => write!(f, "{seq}[{index}]"),
            Term::Length(seq) => write!(f, "_LENGTH({seq})"),
            Term::Field { base, field, .. } => write!(f, "{base}.{field}"),
            Term::Neg(inner) => write!(f, "-{inner}"),
            Term::Arith { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Term::Cmp { op, lhs, rhs } => write!(f, "{lhs} {} {rhs}", op.symbol()),
            Term::Not(inner) => write!(f, "!({inner})"),
            Term::And(items) => write_joined(f, items, " && "),
            Term::Or(items) => write_joined(f, items, " || "),
            Term::Implies(lhs, rhs) => write!(f, "({lhs} => {rhs})"),
            Term::Ite {
                cond,
                then_term,
                else_term,
            } => write!(f, "({cond} ? {then_term} : {else_term})"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Term], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, ")")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Term {
        Term::Var {
            name: name.to_string(),
            sort: Sort::Int,
        }
    }

    #[test]
    fn test_rational_normalizes() {
        let r = Rational::new(6, -4).unwrap();
        assert_eq!((r.numer(), r.denom()), (-3, 2));
        assert_eq!(r, Rational::new(-9, 6).unwrap());
        assert!(Rational::new(1, 0).is_none());
    }

    #[test]
    fn test_rational_floor_ceil() {
        let r = Rational::new(-7, 2).unwrap();
        assert_eq!(r.floor(), -4);
        assert_eq!(r.ceil(), -3);
        let q = Rational::new(7, 2).unwrap();
        assert_eq!(q.floor(), 3);
        assert_eq!(q.ceil(), 4);
    }

    #[test]
    fn test_rational_approximate() {
        let r = Rational::approximate(1.5, 1000).unwrap();
        assert_eq!((r.numer(), r.denom()), (3, 2));
        assert!(Rational::approximate(f64::NAN, 1000).is_none());
    }

    #[test]
    fn test_structural_equality_as_key() {
        let a = Term::Select {
            array: Box::new(var("b")),
            index: Box::new(Term::Int(1)),
        };
        let b = Term::Select {
            array: Box::new(var("b")),
            index: Box::new(Term::Int(1)),
        };
        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_sorts() {
        let mixed = Term::arith(ArithOp::Add, var("a"), Term::Real(Rational::from_int(1)));
        assert_eq!(mixed.sort(), Sort::Real);
        assert_eq!(Term::cmp(CmpOp::Lt, var("a"), Term::Int(3)).sort(), Sort::Bool);
        let seq = Term::Var {
            name: "p".to_string(),
            sort: Sort::Seq(Box::new(Sort::Real)),
        };
        let nth = Term::Nth {
            seq: Box::new(seq),
            index: Box::new(Term::Int(0)),
        };
        assert_eq!(nth.sort(), Sort::Real);
    }

    #[test]
    fn test_display() {
        let t = Term::cmp(
            CmpOp::Le,
            Term::arith(ArithOp::Add, var("a"), Term::Int(2)),
            Term::Int(10),
        );
        assert_eq!(t.to_string(), "(a + 2) <= 10");
    }
}
