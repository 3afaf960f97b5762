//! Predicate re-evaluation for generated cases.
//!
//! Each case is checked against the constraint source text with
//! JavaScript semantics, independently of the solver encoding.

pub mod eval;
pub mod validate;
pub mod value;

pub use eval::{eval, eval_str, EvalError, EvalResult, Scope};
pub use validate::{conjunction, PredicateEvaluator, ScriptEvaluator, Validation, Validator};
pub use value::Value;
