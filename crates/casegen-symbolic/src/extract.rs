//! Model extraction: one satisfiable model becomes one JSON case.

use crate::encoder::{eval_numeral, SymValue};
use crate::session::{CheckOutcome, SolverSession};
use crate::{SymbolicError, SymbolicResult};
use casegen_ir::{
    CmpOp, CompiledConstraints, GaussianConstraint, MemberDescriptor, Qualifier, Rational, Sort,
    StructBlueprint, SymbolEntry, Term, ValueType,
};
use rand::distributions::Distribution;
use rand::Rng;
use serde_json::{Map, Number, Value};
use statrs::distribution::Normal;
use thiserror::Error;
use tracing::debug;
use z3::ast::{Dynamic, Int};
use z3::Model;

/// Denominator used when pinning a Gaussian sample as an exact rational.
const GAUSSIAN_SCALE: i64 = 10_000_000_000;

/// Why a single extraction produced no case. None of these end the run.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("value {value} of '{name}' does not fit in 32 bits")]
    Overflow { name: String, value: i128 },

    #[error("sampled Gaussian values are unsatisfiable with the current model")]
    Unsat,

    #[error("solver returned unknown: {0}")]
    Unknown(String),

    #[error("no value for '{0}' in the model")]
    MissingValue(String),

    #[error(transparent)]
    Symbolic(#[from] SymbolicError),
}

/// A Gaussian constraint with its ready-made distribution.
#[derive(Debug, Clone)]
pub struct GaussianSampler {
    target: Term,
    normal: Normal,
}

impl GaussianSampler {
    pub fn new(constraint: &GaussianConstraint) -> SymbolicResult<Self> {
        let normal = Normal::new(constraint.mean, constraint.std_dev).map_err(|e| {
            SymbolicError::Gaussian {
                mean: constraint.mean,
                std_dev: constraint.std_dev,
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            target: constraint.target.clone(),
            normal,
        })
    }

    pub fn all(compiled: &CompiledConstraints) -> SymbolicResult<Vec<Self>> {
        compiled.gaussians.iter().map(Self::new).collect()
    }

    /// Draw one sample and build the equality that pins the target to it.
    fn pin<R: Rng + ?Sized>(&self, rng: &mut R) -> Term {
        let sample = self.normal.sample(rng);
        let value = if self.target.sort() == Sort::Int {
            Term::Int(sample.round() as i64)
        } else {
            Rational::approximate(sample, GAUSSIAN_SCALE)
                .map(Term::Real)
                .unwrap_or(Term::Int(0))
        };
        debug!(target = %self.target, sample, "gaussian sample");
        Term::cmp(CmpOp::Eq, self.target.clone(), value)
    }
}

/// Extract one case from the current solver state.
///
/// Gaussian targets are pinned to fresh samples in a scope that is
/// retracted before returning.
pub fn extract_case<R: Rng + ?Sized>(
    session: &SolverSession,
    compiled: &CompiledConstraints,
    gaussians: &[GaussianSampler],
    rng: &mut R,
) -> Result<Value, ExtractError> {
    let _scope = session.scope();
    for sampler in gaussians {
        session.assert_term(&sampler.pin(rng))?;
    }
    match session.check() {
        CheckOutcome::Sat => {}
        CheckOutcome::Unsat => return Err(ExtractError::Unsat),
        CheckOutcome::Unknown(reason) => return Err(ExtractError::Unknown(reason)),
    }
    let model = session
        .model()
        .ok_or_else(|| ExtractError::Unknown("no model after sat".to_string()))?;

    let reader = Reader {
        model: &model,
        blueprints: &compiled.blueprints,
    };
    let mut case = Map::new();
    for entry in &compiled.globals {
        let value = session.var(&entry.name)?;
        let shape = Shape::of_entry(entry);
        case.insert(entry.name.clone(), reader.read(&entry.name, value, &shape)?);
    }
    Ok(Value::Object(case))
}

/// Output layout of a value: how deep to index and what the leaves are.
#[derive(Debug, Clone)]
enum Shape<'a> {
    Scalar(&'a ValueType),
    Record(&'a str),
    /// Fixed number of elements.
    Fixed(u64, Box<Shape<'a>>),
    /// Length read from the model.
    Dynamic(Box<Shape<'a>>),
}

impl<'a> Shape<'a> {
    fn of_entry(entry: &'a SymbolEntry) -> Self {
        Self::build(entry.qualifier, &entry.ty, &entry.dims)
    }

    fn of_member(member: &'a MemberDescriptor) -> Self {
        Self::build(member.qualifier, &member.ty, &member.dims)
    }

    fn build(qualifier: Qualifier, ty: &'a ValueType, dims: &[u64]) -> Self {
        let base = match ty {
            ValueType::Struct(name) => Shape::Record(name),
            _ => Shape::Scalar(ty),
        };
        match qualifier {
            Qualifier::Primary => base,
            Qualifier::Pointer => Shape::Dynamic(Box::new(base)),
            Qualifier::Array => dims
                .iter()
                .rev()
                .fold(base, |inner, &d| Shape::Fixed(d, Box::new(inner))),
        }
    }
}

struct Reader<'m> {
    model: &'m Model,
    blueprints: &'m [StructBlueprint],
}

impl Reader<'_> {
    fn read(&self, name: &str, value: &SymValue, shape: &Shape<'_>) -> Result<Value, ExtractError> {
        match shape {
            Shape::Scalar(ty) => self.read_scalar(name, value, ty),
            Shape::Record(record) => {
                let blueprint = self
                    .blueprints
                    .iter()
                    .find(|b| b.name == *record)
                    .ok_or_else(|| ExtractError::MissingValue(name.to_string()))?;
                let mut object = Map::new();
                for (i, member) in blueprint.members.iter().enumerate() {
                    let field = value.field(i)?;
                    let path = format!("{name}.{}", member.name);
                    let shape = Shape::of_member(member);
                    object.insert(member.name.clone(), self.read(&path, &field, &shape)?);
                }
                Ok(Value::Object(object))
            }
            Shape::Fixed(count, inner) => self.read_elements(name, value, *count, inner),
            Shape::Dynamic(inner) => {
                let len = value.length()?;
                let len = eval_numeral(self.model, &Dynamic::from_ast(&len))
                    .ok_or_else(|| ExtractError::MissingValue(format!("{name}.len")))?;
                let count = u64::try_from(len.floor().max(0)).unwrap_or(0);
                self.read_elements(name, value, count, inner)
            }
        }
    }

    fn read_elements(
        &self,
        name: &str,
        value: &SymValue,
        count: u64,
        inner: &Shape<'_>,
    ) -> Result<Value, ExtractError> {
        let mut items = Vec::new();
        for i in 0..count {
            let index = i64::try_from(i).map_err(|_| ExtractError::Overflow {
                name: name.to_string(),
                value: i as i128,
            })?;
            let element = value.element(&Int::from_i64(index))?;
            items.push(self.read(&format!("{name}[{i}]"), &element, inner)?);
        }
        Ok(Value::Array(items))
    }

    fn read_scalar(
        &self,
        name: &str,
        value: &SymValue,
        ty: &ValueType,
    ) -> Result<Value, ExtractError> {
        let leaf = value.as_scalar()?;
        let number = eval_numeral(self.model, leaf)
            .ok_or_else(|| ExtractError::MissingValue(name.to_string()))?;
        if ty.is_real() {
            return Number::from_f64(number.to_f64())
                .map(Value::Number)
                .ok_or_else(|| ExtractError::MissingValue(name.to_string()));
        }
        let n = number.floor();
        let fits = match ty {
            ValueType::Int32 => i32::try_from(n).is_ok(),
            ValueType::UInt32 => u32::try_from(n).is_ok(),
            _ => i64::try_from(n).is_ok(),
        };
        if !fits {
            return Err(ExtractError::Overflow {
                name: name.to_string(),
                value: n,
            });
        }
        Ok(Value::Number(Number::from(n as i64)))
    }
}
