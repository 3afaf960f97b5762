//! Case validation against the constraint source text.

use crate::eval::{eval, EvalResult, Scope};
use crate::value::Value;
use casegen_ir::Mode;
use casegen_syntax::Expr;
use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

/// Something that can decide whether a predicate holds for a set of
/// global bindings.
pub trait PredicateEvaluator {
    /// Evaluate `predicate` with `bindings` in scope. Only a result of
    /// exactly `true` counts as holding.
    fn evaluate(&self, predicate: &str, bindings: &Map<String, Json>) -> EvalResult<bool>;
}

/// The in-process JavaScript-semantics evaluator.
///
/// Parsed predicates are cached, since the same conjunction is evaluated
/// once per case.
#[derive(Debug, Default)]
pub struct ScriptEvaluator {
    cache: std::cell::RefCell<Option<(String, Expr)>>,
}

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn parsed(&self, predicate: &str) -> EvalResult<Expr> {
        let mut cache = self.cache.borrow_mut();
        if let Some((source, expr)) = cache.as_ref() {
            if source == predicate {
                return Ok(expr.clone());
            }
        }
        let expr = casegen_syntax::parse_expression(predicate)?;
        *cache = Some((predicate.to_string(), expr.clone()));
        Ok(expr)
    }
}

impl PredicateEvaluator for ScriptEvaluator {
    fn evaluate(&self, predicate: &str, bindings: &Map<String, Json>) -> EvalResult<bool> {
        let expr = self.parsed(predicate)?;
        let value = eval(&expr, &Scope::new(bindings))?;
        Ok(matches!(value, Value::Bool(true)))
    }
}

/// Join constraint statements into one parenthesized conjunction.
/// No statements at all means the constraints trivially hold.
pub fn conjunction<S: AsRef<str>>(predicates: &[S]) -> String {
    if predicates.is_empty() {
        return "true".to_string();
    }
    predicates
        .iter()
        .map(|p| format!("({})", p.as_ref().trim().trim_end_matches(';')))
        .collect::<Vec<_>>()
        .join(" && ")
}

/// Outcome of validating a batch of cases.
#[derive(Debug, Default)]
pub struct Validation {
    pub accepted: Vec<Json>,
    /// Cases whose predicate result disagreed with the mode.
    pub mismatched: usize,
    /// Cases the evaluator could not evaluate.
    pub errors: usize,
}

/// Accepts a case only when the predicate result matches its mode.
pub struct Validator<E = ScriptEvaluator> {
    evaluator: E,
    predicate: String,
}

impl Validator<ScriptEvaluator> {
    pub fn new<S: AsRef<str>>(predicates: &[S]) -> Self {
        Self::with_evaluator(ScriptEvaluator::new(), predicates)
    }
}

impl<E: PredicateEvaluator> Validator<E> {
    pub fn with_evaluator<S: AsRef<str>>(evaluator: E, predicates: &[S]) -> Self {
        Self {
            evaluator,
            predicate: conjunction(predicates),
        }
    }

    /// The conjunction every case is checked against.
    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    /// Evaluate the conjunction for one case. Non-object cases have no
    /// bindings.
    pub fn holds(&self, case: &Json) -> EvalResult<bool> {
        let empty = Map::new();
        let bindings = case.as_object().unwrap_or(&empty);
        self.evaluator.evaluate(&self.predicate, bindings)
    }

    /// Keep the cases whose predicate result matches `mode`.
    pub fn validate(&self, cases: Vec<Json>, mode: Mode) -> Validation {
        let mut validation = Validation::default();
        for case in cases {
            match self.holds(&case) {
                Ok(result) if result == mode.expected() => {
                    debug!(%mode, "case accepted");
                    validation.accepted.push(case);
                }
                Ok(result) => {
                    warn!(%mode, result, case = %case, "case dropped: predicate disagrees with mode");
                    validation.mismatched += 1;
                }
                Err(e) => {
                    warn!(%mode, error = %e, case = %case, "case dropped: evaluation failed");
                    validation.errors += 1;
                }
            }
        }
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conjunction() {
        assert_eq!(conjunction::<&str>(&[]), "true");
        assert_eq!(
            conjunction(&["a > 5 && a < 10", "b[1] > b[2];"]),
            "(a > 5 && a < 10) && (b[1] > b[2])"
        );
    }

    #[test]
    fn test_empty_constraints_hold() {
        let v = Validator::new::<&str>(&[]);
        assert!(v.holds(&json!({"a": 1})).unwrap());
        let out = v.validate(vec![json!({"a": 1})], Mode::Negative);
        assert!(out.accepted.is_empty());
        assert_eq!(out.mismatched, 1);
    }

    #[test]
    fn test_validate_by_mode() {
        let v = Validator::new(&["a > 5 && a < 10"]);
        let cases = vec![json!({"a": 7}), json!({"a": 12}), json!({"a": 6})];
        let positive = v.validate(cases.clone(), Mode::Positive);
        assert_eq!(positive.accepted, vec![json!({"a": 7}), json!({"a": 6})]);
        assert_eq!(positive.mismatched, 1);
        let negative = v.validate(cases, Mode::Negative);
        assert_eq!(negative.accepted, vec![json!({"a": 12})]);
    }

    #[test]
    fn test_evaluation_errors_are_counted() {
        let v = Validator::new(&["missing > 0"]);
        let out = v.validate(vec![json!({"a": 1})], Mode::Negative);
        assert!(out.accepted.is_empty());
        assert_eq!(out.errors, 1);
    }

    #[test]
    fn test_gaussian_and_length() {
        let v = Validator::new(&[
            "GAUSSIAN(t, 20.0, 2.5)",
            "_LENGTH(buf) > 2 && _LENGTH(buf) < 6",
            "buf[0] == x + y",
        ]);
        let good = json!({"t": 19.2, "buf": [5, 0, 0], "x": 3, "y": 2});
        let bad = json!({"t": 19.2, "buf": [5, 0], "x": 3, "y": 2});
        assert!(v.holds(&good).unwrap());
        assert!(!v.holds(&bad).unwrap());
    }

    struct Always(bool);

    impl PredicateEvaluator for Always {
        fn evaluate(&self, _: &str, _: &Map<String, Json>) -> EvalResult<bool> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_custom_evaluator() {
        let v = Validator::with_evaluator(Always(false), &["anything"]);
        let out = v.validate(vec![json!({}), json!({"x": 1})], Mode::Negative);
        assert_eq!(out.accepted.len(), 2);
    }

    #[test]
    fn test_cache_follows_predicate() {
        let e = ScriptEvaluator::new();
        let map = json!({"a": 3});
        let map = map.as_object().unwrap();
        assert!(e.evaluate("a == 3", map).unwrap());
        assert!(!e.evaluate("a == 4", map).unwrap());
        assert!(e.evaluate("a == 3", map).unwrap());
    }
}
