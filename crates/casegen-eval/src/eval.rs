//! Expression evaluator with JavaScript semantics.

use crate::value::{to_uint32, Value};
use casegen_syntax::{BinOp, Expr, ExprKind, Span, UnaryOp, GAUSSIAN_PRIMITIVE, LENGTH_PRIMITIVE};
use serde_json::{Map, Value as Json};
use thiserror::Error;

/// Evaluation error.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("{0} is not defined")]
    ReferenceError(String),

    #[error("cannot read '{property}' of {target} at {span}")]
    NullAccess {
        property: String,
        target: &'static str,
        span: Span,
    },

    #[error("'{0}' is not a function")]
    NotCallable(String),

    #[error("unsupported expression at {span}: {construct}")]
    Unsupported { construct: &'static str, span: Span },

    #[error(transparent)]
    Parse(#[from] casegen_syntax::ParseError),
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Global bindings for one evaluation: the fields of a case.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    globals: &'a Map<String, Json>,
}

impl<'a> Scope<'a> {
    pub fn new(globals: &'a Map<String, Json>) -> Self {
        Self { globals }
    }

    fn lookup(&self, name: &str) -> EvalResult<Value<'a>> {
        if let Some(json) = self.globals.get(name) {
            return Ok(Value::from_json(json));
        }
        match name {
            "undefined" => Ok(Value::Undefined),
            "null" => Ok(Value::Null),
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "NaN" => Ok(Value::Number(f64::NAN)),
            "Infinity" => Ok(Value::Number(f64::INFINITY)),
            _ => Err(EvalError::ReferenceError(name.to_string())),
        }
    }
}

/// Evaluate an expression against the given bindings.
pub fn eval<'a>(expr: &Expr, scope: &Scope<'a>) -> EvalResult<Value<'a>> {
    match &expr.kind {
        ExprKind::Int(n) => Ok(Value::Number(*n as f64)),
        ExprKind::Float(x) => Ok(Value::Number(*x)),
        ExprKind::String(s) => Ok(Value::String(s.clone())),
        ExprKind::Ident(name) => scope.lookup(name),
        ExprKind::Paren(inner) => eval(inner, scope),

        ExprKind::Index { base, index } => {
            let target = eval(base, scope)?;
            let key = eval(index, scope)?;
            member(target, &key.to_js_string(), expr.span)
        }
        ExprKind::Field { base, field } => {
            let target = eval(base, scope)?;
            member(target, &field.name, expr.span)
        }
        ExprKind::Call { callee, args } => eval_call(callee, args, scope),

        ExprKind::Unary { op, operand } => {
            let value = eval(operand, scope)?;
            match op {
                UnaryOp::Plus => Ok(Value::Number(value.to_number())),
                UnaryOp::Neg => Ok(Value::Number(-value.to_number())),
                UnaryOp::Not => Ok(Value::Bool(!value.to_boolean())),
                UnaryOp::BitNot => Ok(Value::Number(f64::from(!value.to_int32()))),
                UnaryOp::AddressOf | UnaryOp::Deref => Err(unsupported("pointer operator", expr)),
                UnaryOp::PreInc | UnaryOp::PreDec => Err(unsupported("increment", expr)),
            }
        }

        ExprKind::Chain { operands, ops, .. } => {
            let Some((first, rest)) = operands.split_first() else {
                return Ok(Value::Undefined);
            };
            let mut acc = eval(first, scope)?;
            for (op, operand) in ops.iter().zip(rest) {
                acc = match op {
                    BinOp::And if !acc.to_boolean() => acc,
                    BinOp::Or if acc.to_boolean() => acc,
                    BinOp::And | BinOp::Or => eval(operand, scope)?,
                    _ => binary(*op, &acc, &eval(operand, scope)?),
                };
            }
            Ok(acc)
        }

        ExprKind::Conditional {
            cond,
            then_branch,
            else_branch,
        } => {
            if eval(cond, scope)?.to_boolean() {
                eval(then_branch, scope)
            } else {
                eval(else_branch, scope)
            }
        }

        ExprKind::Comma(items) => {
            let mut last = Value::Undefined;
            for item in items {
                last = eval(item, scope)?;
            }
            Ok(last)
        }

        ExprKind::Arrow { .. } => Err(unsupported("'->' access", expr)),
        ExprKind::PostIncDec { .. } => Err(unsupported("increment", expr)),
        ExprKind::Sizeof(_) => Err(unsupported("sizeof", expr)),
        ExprKind::Cast { .. } => Err(unsupported("cast", expr)),
        ExprKind::Assign { .. } => Err(unsupported("assignment", expr)),
    }
}

fn unsupported(construct: &'static str, expr: &Expr) -> EvalError {
    EvalError::Unsupported {
        construct,
        span: expr.span,
    }
}

/// Property access: `target[key]` or `target.key`.
fn member<'a>(target: Value<'a>, key: &str, span: Span) -> EvalResult<Value<'a>> {
    match target {
        Value::Undefined | Value::Null => Err(EvalError::NullAccess {
            property: key.to_string(),
            target: target.type_name(),
            span,
        }),
        Value::Array(items) => {
            if key == "length" {
                return Ok(Value::Number(items.len() as f64));
            }
            Ok(array_index(key)
                .and_then(|i| items.get(i))
                .map_or(Value::Undefined, Value::from_json))
        }
        Value::Object(map) => Ok(map.get(key).map_or(Value::Undefined, Value::from_json)),
        Value::String(s) if key == "length" => Ok(Value::Number(s.encode_utf16().count() as f64)),
        _ => Ok(Value::Undefined),
    }
}

/// Canonical array index form of a property key.
fn array_index(key: &str) -> Option<usize> {
    let index: usize = key.parse().ok()?;
    (index.to_string() == key).then_some(index)
}

fn eval_call<'a>(callee: &Expr, args: &[Expr], scope: &Scope<'a>) -> EvalResult<Value<'a>> {
    let ExprKind::Ident(name) = &callee.kind else {
        return Err(EvalError::NotCallable(callee.span.to_string()));
    };
    let values = args
        .iter()
        .map(|arg| eval(arg, scope))
        .collect::<EvalResult<Vec<_>>>()?;
    match name.as_str() {
        LENGTH_PRIMITIVE => match values.first() {
            Some(target) => member(target.clone(), "length", callee.span),
            None => Err(EvalError::NullAccess {
                property: "length".to_string(),
                target: "undefined",
                span: callee.span,
            }),
        },
        // Sampling already happened during generation.
        GAUSSIAN_PRIMITIVE => Ok(Value::Bool(true)),
        _ => Err(EvalError::NotCallable(name.clone())),
    }
}

/// Non-short-circuit binary operators.
fn binary<'a>(op: BinOp, lhs: &Value<'a>, rhs: &Value<'a>) -> Value<'a> {
    match op {
        BinOp::Add => add(lhs, rhs),
        BinOp::Sub => Value::Number(lhs.to_number() - rhs.to_number()),
        BinOp::Mul => Value::Number(lhs.to_number() * rhs.to_number()),
        BinOp::Div => Value::Number(lhs.to_number() / rhs.to_number()),
        BinOp::Mod => Value::Number(lhs.to_number() % rhs.to_number()),
        BinOp::Shl => Value::Number(f64::from(
            lhs.to_int32().wrapping_shl(to_uint32(rhs.to_number()) & 31),
        )),
        BinOp::Shr => Value::Number(f64::from(
            lhs.to_int32().wrapping_shr(to_uint32(rhs.to_number()) & 31),
        )),
        BinOp::BitAnd => Value::Number(f64::from(lhs.to_int32() & rhs.to_int32())),
        BinOp::BitXor => Value::Number(f64::from(lhs.to_int32() ^ rhs.to_int32())),
        BinOp::BitOr => Value::Number(f64::from(lhs.to_int32() | rhs.to_int32())),
        BinOp::Lt => Value::Bool(less_than(lhs, rhs)),
        BinOp::Gt => Value::Bool(less_than(rhs, lhs)),
        BinOp::Le => Value::Bool(less_equal(lhs, rhs)),
        BinOp::Ge => Value::Bool(less_equal(rhs, lhs)),
        BinOp::Eq => Value::Bool(lhs.loose_eq(rhs)),
        BinOp::Ne => Value::Bool(!lhs.loose_eq(rhs)),
        // Short-circuit operators never reach here.
        BinOp::And | BinOp::Or => Value::Undefined,
    }
}

fn add<'a>(lhs: &Value<'a>, rhs: &Value<'a>) -> Value<'a> {
    let (l, r) = (lhs.to_primitive(), rhs.to_primitive());
    if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
        Value::String(l.to_js_string() + &r.to_js_string())
    } else {
        Value::Number(l.to_number() + r.to_number())
    }
}

/// Abstract relational comparison. NaN on either side compares false.
fn less_than(lhs: &Value<'_>, rhs: &Value<'_>) -> bool {
    match (lhs.to_primitive(), rhs.to_primitive()) {
        (Value::String(a), Value::String(b)) => a.encode_utf16().lt(b.encode_utf16()),
        (a, b) => a.to_number() < b.to_number(),
    }
}

fn less_equal(lhs: &Value<'_>, rhs: &Value<'_>) -> bool {
    match (lhs.to_primitive(), rhs.to_primitive()) {
        (Value::String(a), Value::String(b)) => a.encode_utf16().le(b.encode_utf16()),
        (a, b) => a.to_number() <= b.to_number(),
    }
}

/// Evaluate a bare expression string against `globals`.
pub fn eval_str(source: &str, globals: &Map<String, Json>) -> EvalResult<bool> {
    let expr = casegen_syntax::parse_expression(source)?;
    let value = eval(&expr, &Scope::new(globals))?;
    Ok(matches!(value, Value::Bool(true)))
}
