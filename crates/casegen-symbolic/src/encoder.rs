//! Term encoder: translates compiled [`Term`]s to Z3 ASTs.
//!
//! Every declared variable is allocated as a tree of symbolic values whose
//! leaves are Z3 constants. Records are positional field lists; fixed arrays
//! and sequences push their index dimension down into the leaves, so an
//! array of records is stored as one Z3 array per member and an element
//! access is a `select` on every leaf underneath it.

use crate::{SymbolicError, SymbolicResult};
use casegen_ir::{
    ArithOp, CmpOp, CompiledConstraints, Rational, Sort as IrSort, StructBlueprint, Term,
};
use std::collections::HashMap;
use z3::ast::{Array, Ast, Bool, Dynamic, Int, Real};
use z3::{Model, Sort};

/// Symbolic value of a variable or sub-term.
#[derive(Debug, Clone)]
pub enum SymValue {
    /// Bool, Int or Real leaf, possibly wrapped in index layers.
    Scalar(Dynamic),
    /// Record members in blueprint order.
    Record {
        blueprint: String,
        fields: Vec<SymValue>,
    },
    /// Fixed-size array with its declared bound.
    Array { bound: u64, elems: Box<SymValue> },
    /// Unbounded sequence with a length leaf.
    Seq {
        len: Box<SymValue>,
        elems: Box<SymValue>,
    },
}

impl SymValue {
    /// Apply one `select` to every leaf, peeling the outermost index layer.
    fn select(&self, index: &Int) -> SymbolicResult<SymValue> {
        match self {
            SymValue::Scalar(leaf) => {
                let array = leaf.as_array().ok_or_else(|| {
                    SymbolicError::Encoding(format!("indexed a non-array leaf: {leaf}"))
                })?;
                Ok(SymValue::Scalar(array.select(index)))
            }
            SymValue::Record { blueprint, fields } => Ok(SymValue::Record {
                blueprint: blueprint.clone(),
                fields: fields
                    .iter()
                    .map(|f| f.select(index))
                    .collect::<SymbolicResult<_>>()?,
            }),
            SymValue::Array { bound, elems } => Ok(SymValue::Array {
                bound: *bound,
                elems: Box::new(elems.select(index)?),
            }),
            SymValue::Seq { len, elems } => Ok(SymValue::Seq {
                len: Box::new(len.select(index)?),
                elems: Box::new(elems.select(index)?),
            }),
        }
    }

    /// Element `index` of an array or sequence.
    pub fn element(&self, index: &Int) -> SymbolicResult<SymValue> {
        match self {
            SymValue::Array { elems, .. } | SymValue::Seq { elems, .. } => elems.select(index),
            _ => Err(SymbolicError::Encoding("element access on a non-sequence".into())),
        }
    }

    /// Length leaf of a sequence.
    pub fn length(&self) -> SymbolicResult<Int> {
        match self {
            SymValue::Seq { len, .. } => len.as_int(),
            _ => Err(SymbolicError::Encoding("length of a non-sequence".into())),
        }
    }

    /// Member `index` of a record.
    pub fn field(&self, index: usize) -> SymbolicResult<SymValue> {
        match self {
            SymValue::Record { fields, .. } => fields
                .get(index)
                .cloned()
                .ok_or_else(|| SymbolicError::Encoding(format!("field index {index} out of range"))),
            _ => Err(SymbolicError::Encoding("field access on a non-record".into())),
        }
    }

    pub fn as_scalar(&self) -> SymbolicResult<&Dynamic> {
        match self {
            SymValue::Scalar(d) => Ok(d),
            _ => Err(SymbolicError::Encoding("expected a scalar value".into())),
        }
    }

    fn as_int(&self) -> SymbolicResult<Int> {
        let d = self.as_scalar()?;
        d.as_int()
            .ok_or_else(|| SymbolicError::Encoding(format!("expected Int, got: {d}")))
    }
}

/// Int or Real operand, after sort inspection.
enum Num {
    Int(Int),
    Real(Real),
}

impl Num {
    fn from_value(value: &SymValue) -> SymbolicResult<Num> {
        let d = value.as_scalar()?;
        if let Some(i) = d.as_int() {
            Ok(Num::Int(i))
        } else if let Some(r) = d.as_real() {
            Ok(Num::Real(r))
        } else {
            Err(SymbolicError::Encoding(format!("expected a number, got: {d}")))
        }
    }

    fn into_real(self) -> Real {
        match self {
            Num::Int(i) => i.to_real(),
            Num::Real(r) => r,
        }
    }
}

/// Exact Z3 real for a rational literal.
pub fn real_literal(value: Rational) -> SymbolicResult<Real> {
    let num = i64::try_from(value.numer())
        .map_err(|_| SymbolicError::Encoding(format!("literal {value} out of range")))?;
    let den = i64::try_from(value.denom())
        .map_err(|_| SymbolicError::Encoding(format!("literal {value} out of range")))?;
    let n = Int::from_i64(num).to_real();
    if den == 1 {
        Ok(n)
    } else {
        Ok(n.div(&Int::from_i64(den).to_real()))
    }
}

/// Base sort of a leaf.
#[derive(Debug, Clone, Copy)]
enum Base {
    Int,
    Real,
}

impl Base {
    fn sort(self) -> Sort {
        match self {
            Base::Int => Sort::int(),
            Base::Real => Sort::real(),
        }
    }
}

/// Variable allocation and term encoding for one solver session.
#[derive(Debug)]
pub struct Encoder {
    vars: HashMap<String, SymValue>,
}

impl Encoder {
    /// Allocate one symbolic value per global variable.
    pub fn new(compiled: &CompiledConstraints) -> SymbolicResult<Self> {
        let mut vars = HashMap::new();
        for entry in &compiled.globals {
            let value = declare(
                &entry.name,
                &entry.sort(),
                &entry.dims,
                0,
                &compiled.blueprints,
            )?;
            vars.insert(entry.name.clone(), value);
        }
        Ok(Self { vars })
    }

    pub fn var(&self, name: &str) -> SymbolicResult<&SymValue> {
        self.vars
            .get(name)
            .ok_or_else(|| SymbolicError::UnknownVariable(name.to_string()))
    }

    /// Encode a boolean term. Well-formedness conditions for every element
    /// and length access inside it are appended to `side`.
    pub fn encode_bool(&self, term: &Term, side: &mut Vec<Bool>) -> SymbolicResult<Bool> {
        let value = self.encode(term, side)?;
        let d = value.as_scalar()?;
        d.as_bool()
            .ok_or_else(|| SymbolicError::Encoding(format!("expected Bool, got: {term}")))
    }

    /// Encode a term as a symbolic value.
    pub fn encode(&self, term: &Term, side: &mut Vec<Bool>) -> SymbolicResult<SymValue> {
        match term {
            // === Literals ===
            Term::Bool(b) => Ok(scalar(&Bool::from_bool(*b))),
            Term::Int(n) => Ok(scalar(&Int::from_i64(*n))),
            Term::Real(r) => Ok(scalar(&real_literal(*r)?)),

            // === Variables and accessors ===
            Term::Var { name, .. } => self.var(name).cloned(),
            Term::Primitive(_) | Term::GaussianSentinel => Err(SymbolicError::Encoding(format!(
                "constraint primitive used as a value: {term}"
            ))),
            Term::Select { array, index } => {
                let base = self.encode(array, side)?;
                let i = self.encode_int(index, side)?;
                let SymValue::Array { bound, .. } = &base else {
                    return Err(SymbolicError::Encoding(format!("not an array: {array}")));
                };
                let in_range = matches!(**index, Term::Int(n) if n >= 0 && (n as u64) < *bound);
                if !in_range {
                    let upper = Int::from_i64(i64::try_from(*bound).unwrap_or(i64::MAX));
                    side.push(Bool::and(&[i.ge(&Int::from_i64(0)), i.lt(&upper)]));
                }
                base.element(&i)
            }
            Term::Nth { seq, index } => {
                let base = self.encode(seq, side)?;
                let i = self.encode_int(index, side)?;
                let len = base.length()?;
                side.push(Bool::and(&[i.ge(&Int::from_i64(0)), i.lt(&len)]));
                base.element(&i)
            }
            Term::Length(seq) => {
                let len = self.encode(seq, side)?.length()?;
                side.push(len.ge(&Int::from_i64(0)));
                Ok(scalar(&len))
            }
            Term::Field { base, index, .. } => self.encode(base, side)?.field(*index),

            // === Arithmetic ===
            Term::Neg(inner) => match self.encode_num(inner, side)? {
                Num::Int(i) => Ok(scalar(&i.unary_minus())),
                Num::Real(r) => Ok(scalar(&r.unary_minus())),
            },
            Term::Arith { op, lhs, rhs } => {
                let l = self.encode_num(lhs, side)?;
                let r = self.encode_num(rhs, side)?;
                encode_arith(*op, l, r)
            }

            // === Comparison ===
            Term::Cmp { op, lhs, rhs } => {
                let l = self.encode_num(lhs, side)?;
                let r = self.encode_num(rhs, side)?;
                Ok(scalar(&encode_cmp(*op, l, r)))
            }

            // === Logic ===
            Term::Not(inner) => Ok(scalar(&self.encode_bool(inner, side)?.not())),
            Term::And(items) => {
                let parts = self.encode_all(items, side)?;
                Ok(scalar(&Bool::and(&parts)))
            }
            Term::Or(items) => {
                let parts = self.encode_all(items, side)?;
                Ok(scalar(&Bool::or(&parts)))
            }
            Term::Implies(lhs, rhs) => {
                let l = self.encode_bool(lhs, side)?;
                let r = self.encode_bool(rhs, side)?;
                Ok(scalar(&l.implies(&r)))
            }
            Term::Ite {
                cond,
                then_term,
                else_term,
            } => {
                let c = self.encode_bool(cond, side)?;
                let t = self.encode(then_term, side)?;
                let e = self.encode(else_term, side)?;
                let (td, ed) = (t.as_scalar()?, e.as_scalar()?);
                if let (Some(tb), Some(eb)) = (td.as_bool(), ed.as_bool()) {
                    return Ok(scalar(&c.ite(&tb, &eb)));
                }
                match (Num::from_value(&t)?, Num::from_value(&e)?) {
                    (Num::Int(ti), Num::Int(ei)) => Ok(scalar(&c.ite(&ti, &ei))),
                    (t, e) => Ok(scalar(&c.ite(&t.into_real(), &e.into_real()))),
                }
            }
        }
    }

    fn encode_all(&self, items: &[Term], side: &mut Vec<Bool>) -> SymbolicResult<Vec<Bool>> {
        items.iter().map(|t| self.encode_bool(t, side)).collect()
    }

    fn encode_num(&self, term: &Term, side: &mut Vec<Bool>) -> SymbolicResult<Num> {
        Num::from_value(&self.encode(term, side)?)
    }

    fn encode_int(&self, term: &Term, side: &mut Vec<Bool>) -> SymbolicResult<Int> {
        match self.encode_num(term, side)? {
            Num::Int(i) => Ok(i),
            Num::Real(_) => Err(SymbolicError::Encoding(format!("expected Int index: {term}"))),
        }
    }
}

fn scalar<A: Ast>(ast: &A) -> SymValue {
    SymValue::Scalar(Dynamic::from_ast(ast))
}

fn encode_arith(op: ArithOp, l: Num, r: Num) -> SymbolicResult<SymValue> {
    match (l, r) {
        (Num::Int(l), Num::Int(r)) => Ok(scalar(&match op {
            ArithOp::Add => Int::add(&[l, r]),
            ArithOp::Sub => Int::sub(&[l, r]),
            ArithOp::Mul => Int::mul(&[l, r]),
            ArithOp::Div => l.div(&r),
            ArithOp::Mod => l.modulo(&r),
        })),
        (l, r) => {
            let (l, r) = (l.into_real(), r.into_real());
            Ok(scalar(&match op {
                ArithOp::Add => Real::add(&[l, r]),
                ArithOp::Sub => Real::sub(&[l, r]),
                ArithOp::Mul => Real::mul(&[l, r]),
                ArithOp::Div => l.div(&r),
                ArithOp::Mod => {
                    return Err(SymbolicError::Encoding("`%` on real operands".into()))
                }
            }))
        }
    }
}

fn encode_cmp(op: CmpOp, l: Num, r: Num) -> Bool {
    match (l, r) {
        (Num::Int(l), Num::Int(r)) => match op {
            CmpOp::Eq => l.eq(&r),
            CmpOp::Ne => l.eq(&r).not(),
            CmpOp::Lt => l.lt(&r),
            CmpOp::Le => l.le(&r),
            CmpOp::Gt => l.gt(&r),
            CmpOp::Ge => l.ge(&r),
        },
        (l, r) => {
            let (l, r) = (l.into_real(), r.into_real());
            match op {
                CmpOp::Eq => l.eq(&r),
                CmpOp::Ne => l.eq(&r).not(),
                CmpOp::Lt => l.lt(&r),
                CmpOp::Le => l.le(&r),
                CmpOp::Gt => l.gt(&r),
                CmpOp::Ge => l.ge(&r),
            }
        }
    }
}

/// Allocate the symbolic value for a variable of `sort` nested under
/// `depth` enclosing index layers. `dims` supplies fixed array bounds.
fn declare(
    name: &str,
    sort: &IrSort,
    dims: &[u64],
    depth: usize,
    blueprints: &[StructBlueprint],
) -> SymbolicResult<SymValue> {
    match sort {
        IrSort::Int => Ok(SymValue::Scalar(leaf(name, Base::Int, depth))),
        IrSort::Real => Ok(SymValue::Scalar(leaf(name, Base::Real, depth))),
        IrSort::Struct(record) => {
            let blueprint = blueprints
                .iter()
                .find(|b| b.name == *record)
                .ok_or_else(|| SymbolicError::Encoding(format!("unknown struct '{record}'")))?;
            let fields = blueprint
                .members
                .iter()
                .map(|m| {
                    declare(
                        &format!("{name}.{}", m.name),
                        &m.sort(),
                        &m.dims,
                        depth,
                        blueprints,
                    )
                })
                .collect::<SymbolicResult<_>>()?;
            Ok(SymValue::Record {
                blueprint: record.clone(),
                fields,
            })
        }
        IrSort::Array(inner) => {
            let Some((&bound, rest)) = dims.split_first() else {
                return Err(SymbolicError::Encoding(format!(
                    "array '{name}' has no declared bound"
                )));
            };
            Ok(SymValue::Array {
                bound,
                elems: Box::new(declare(name, inner, rest, depth + 1, blueprints)?),
            })
        }
        IrSort::Seq(inner) => Ok(SymValue::Seq {
            len: Box::new(SymValue::Scalar(leaf(
                &format!("{name}.len"),
                Base::Int,
                depth,
            ))),
            elems: Box::new(declare(
                &format!("{name}[]"),
                inner,
                &[],
                depth + 1,
                blueprints,
            )?),
        }),
        IrSort::Bool | IrSort::Primitive => Err(SymbolicError::Encoding(format!(
            "variable '{name}' has no value sort"
        ))),
    }
}

/// A fresh constant of `base` wrapped in `depth` int-indexed array layers.
fn leaf(name: &str, base: Base, depth: usize) -> Dynamic {
    if depth == 0 {
        return match base {
            Base::Int => Dynamic::from_ast(&Int::new_const(name)),
            Base::Real => Dynamic::from_ast(&Real::new_const(name)),
        };
    }
    let range = (1..depth).fold(base.sort(), |inner, _| Sort::array(&Sort::int(), &inner));
    Dynamic::from_ast(&Array::new_const(name, &Sort::int(), &range))
}

/// Evaluate a numeric leaf in a model as an exact rational.
pub fn eval_numeral(model: &Model, value: &Dynamic) -> Option<Rational> {
    let evaluated = model.eval(value, true)?;
    if let Some(n) = evaluated.as_int().and_then(|i| i.as_i64()) {
        return Some(Rational::from_int(n));
    }
    parse_numeral(&evaluated.to_string())
}

/// Parse a printed Z3 numeral: `5`, `2.5`, `(- 3)`, `(/ 1.0 3.0)`.
pub fn parse_numeral(text: &str) -> Option<Rational> {
    let tokens: Vec<String> = text
        .replace('(', " ( ")
        .replace(')', " ) ")
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let mut pos = 0;
    let value = parse_sexpr(&tokens, &mut pos)?;
    (pos == tokens.len()).then_some(value)
}

fn parse_sexpr(tokens: &[String], pos: &mut usize) -> Option<Rational> {
    let token = tokens.get(*pos)?;
    *pos += 1;
    if token != "(" {
        return parse_decimal(token);
    }
    let op = tokens.get(*pos)?.clone();
    *pos += 1;
    let first = parse_sexpr(tokens, pos)?;
    let result = match op.as_str() {
        "-" if tokens.get(*pos).map(String::as_str) == Some(")") => first.checked_neg()?,
        "-" => first.checked_sub(parse_sexpr(tokens, pos)?)?,
        "/" => first.checked_div(parse_sexpr(tokens, pos)?)?,
        "+" => first.checked_add(parse_sexpr(tokens, pos)?)?,
        _ => return None,
    };
    if tokens.get(*pos).map(String::as_str) != Some(")") {
        return None;
    }
    *pos += 1;
    Some(result)
}

fn parse_decimal(token: &str) -> Option<Rational> {
    let token = token.trim_end_matches('?');
    match token.split_once('.') {
        None => token.parse::<i128>().ok().and_then(|n| Rational::new(n, 1)),
        Some((whole, frac)) => {
            let digits = format!("{whole}{frac}");
            let scale = 10i128.checked_pow(u32::try_from(frac.len()).ok()?)?;
            Rational::new(digits.parse::<i128>().ok()?, scale)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casegen_ir::compile;
    use z3::{SatResult, Solver};

    fn compiled(src: &str) -> CompiledConstraints {
        let unit = casegen_syntax::parse(src).unwrap();
        compile(&unit, src).unwrap()
    }

    fn solve(src: &str) -> (Encoder, Solver) {
        let c = compiled(src);
        let encoder = Encoder::new(&c).unwrap();
        let solver = Solver::new();
        for a in &c.assertions {
            let mut side = Vec::new();
            let b = encoder.encode_bool(&a.term, &mut side).unwrap();
            solver.assert(&b);
            for s in &side {
                solver.assert(s);
            }
        }
        (encoder, solver)
    }

    #[test]
    fn test_parse_numeral_forms() {
        assert_eq!(parse_numeral("5"), Some(Rational::from_int(5)));
        assert_eq!(parse_numeral("(- 7)"), Some(Rational::from_int(-7)));
        assert_eq!(parse_numeral("2.5"), Rational::new(5, 2));
        assert_eq!(parse_numeral("(/ 1.0 3.0)"), Rational::new(1, 3));
        assert_eq!(parse_numeral("(- (/ 1.0 4.0))"), Rational::new(-1, 4));
        assert_eq!(parse_numeral("(foo 1)"), None);
        assert_eq!(parse_numeral("1 2"), None);
    }

    #[test]
    fn test_scalar_constraints_sat() {
        let (encoder, solver) = solve("int a; int _CONSTRAINT(void) { a > 5 && a < 7; }");
        assert_eq!(solver.check(), SatResult::Sat);
        let model = solver.get_model().unwrap();
        let a = encoder.var("a").unwrap().as_scalar().unwrap().clone();
        assert_eq!(eval_numeral(&model, &a), Some(Rational::from_int(6)));
    }

    #[test]
    fn test_array_of_records_field_projection() {
        let (encoder, solver) = solve(
            "struct P { int x; double c; } ps[3];\n\
             int _CONSTRAINT(void) { ps[1].x == 4; ps[2].c > 0.5 && ps[2].c < 0.75; }",
        );
        assert_eq!(solver.check(), SatResult::Sat);
        let model = solver.get_model().unwrap();
        let ps = encoder.var("ps").unwrap();
        let x = ps.element(&Int::from_i64(1)).unwrap().field(0).unwrap();
        let x = x.as_scalar().unwrap();
        assert_eq!(eval_numeral(&model, x), Some(Rational::from_int(4)));
        let c = ps.element(&Int::from_i64(2)).unwrap().field(1).unwrap();
        let c = eval_numeral(&model, c.as_scalar().unwrap()).unwrap();
        assert!(c.to_f64() > 0.5 && c.to_f64() < 0.75);
    }

    #[test]
    fn test_sequence_length_and_elements() {
        let (encoder, solver) = solve(
            "int *p;\nint _CONSTRAINT(void) { _LENGTH(p) == 3; p[2] == 11; }",
        );
        assert_eq!(solver.check(), SatResult::Sat);
        let model = solver.get_model().unwrap();
        let p = encoder.var("p").unwrap();
        let len = Dynamic::from_ast(&p.length().unwrap());
        assert_eq!(eval_numeral(&model, &len), Some(Rational::from_int(3)));
    }

    #[test]
    fn test_out_of_range_index_unsat() {
        let (_, solver) = solve("int *p;\nint _CONSTRAINT(void) { _LENGTH(p) == 2; p[5] > 0; }");
        assert_eq!(solver.check(), SatResult::Unsat);
        let (_, solver) = solve("int b[2]; int i;\nint _CONSTRAINT(void) { i > 4; b[i] > 0; }");
        assert_eq!(solver.check(), SatResult::Unsat);
    }

    #[test]
    fn test_mixed_int_real_promotes() {
        let (_, solver) =
            solve("int a; double d;\nint _CONSTRAINT(void) { a + d == 2.5; a == 1; d < 1.0; }");
        assert_eq!(solver.check(), SatResult::Unsat);
    }
}
