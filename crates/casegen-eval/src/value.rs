//! JavaScript runtime values over borrowed JSON bindings.
//!
//! Arrays and objects are never copied out of the case being validated;
//! they borrow from it for the duration of one evaluation.

use serde_json::{Map, Value as Json};
use std::fmt;

/// A JavaScript value.
#[derive(Debug, Clone)]
pub enum Value<'a> {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(&'a [Json]),
    Object(&'a Map<String, Json>),
}

impl<'a> Value<'a> {
    /// View a JSON binding as a JavaScript value.
    pub fn from_json(json: &'a Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::Array(items),
            Json::Object(map) => Value::Object(map),
        }
    }

    /// `typeof`-style name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// `ToBoolean`.
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => !(n.is_nan() || *n == 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// `ToNumber`. Arrays and objects go through their string form first.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(_) | Value::Object(_) => string_to_number(&self.to_js_string()),
        }
    }

    /// `ToInt32`: truncate, wrap modulo 2^32, reinterpret as signed.
    pub fn to_int32(&self) -> i32 {
        to_int32(self.to_number())
    }

    /// `ToString`.
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|item| match Value::from_json(item) {
                    v if v.is_nullish() => String::new(),
                    v => v.to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
        }
    }

    /// Whether `ToPrimitive` would leave this value unchanged.
    fn is_primitive(&self) -> bool {
        !matches!(self, Value::Array(_) | Value::Object(_))
    }

    /// `ToPrimitive` with the default hint.
    pub fn to_primitive(&self) -> Value<'a> {
        if self.is_primitive() {
            self.clone()
        } else {
            Value::String(self.to_js_string())
        }
    }

    /// Abstract equality (`==`).
    pub fn loose_eq(&self, other: &Value<'a>) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => std::ptr::eq(*a, *b),
            (Value::Object(a), Value::Object(b)) => std::ptr::eq(*a, *b),
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_eq(other),
            (_, Value::Bool(_)) => self.loose_eq(&Value::Number(other.to_number())),
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (a, b) if !a.is_primitive() => a.to_primitive().loose_eq(b),
            (a, b) => a.loose_eq(&b.to_primitive()),
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(_) => write!(f, "[{}]", self.to_js_string()),
            other => f.write_str(&other.to_js_string()),
        }
    }
}

/// `ToInt32` on a number.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let wrapped = n.trunc().rem_euclid(4_294_967_296.0);
    (wrapped as u32) as i32
}

/// `ToUint32` on a number.
pub fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}

fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    match s {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        // Rust accepts "inf" and "nan", JavaScript does not.
        _ if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => s.parse().unwrap_or(f64::NAN),
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let name = if n > 0.0 { "Infinity" } else { "-Infinity" };
        name.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_boolean() {
        assert!(!Value::Undefined.to_boolean());
        assert!(!Value::Number(0.0).to_boolean());
        assert!(!Value::Number(f64::NAN).to_boolean());
        assert!(Value::Number(-2.0).to_boolean());
        assert!(!Value::String(String::new()).to_boolean());
        let empty = json!([]);
        assert!(Value::from_json(&empty).to_boolean());
    }

    #[test]
    fn test_to_number() {
        assert!(Value::Undefined.to_number().is_nan());
        assert_eq!(Value::Null.to_number(), 0.0);
        assert_eq!(Value::Bool(true).to_number(), 1.0);
        assert_eq!(Value::String(" 12 ".into()).to_number(), 12.0);
        assert_eq!(Value::String("0x1f".into()).to_number(), 31.0);
        assert!(Value::String("inf".into()).to_number().is_nan());
        assert!(Value::String("1e3".into()).to_number() == 1000.0);
        let single = json!([7]);
        let many = json!([1, 2]);
        let empty = json!([]);
        assert_eq!(Value::from_json(&single).to_number(), 7.0);
        assert!(Value::from_json(&many).to_number().is_nan());
        assert_eq!(Value::from_json(&empty).to_number(), 0.0);
    }

    #[test]
    fn test_to_int32() {
        assert_eq!(to_int32(1.9), 1);
        assert_eq!(to_int32(-1.9), -1);
        assert_eq!(to_int32(4_294_967_296.0 + 5.0), 5);
        assert_eq!(to_int32(2_147_483_648.0), i32::MIN);
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_uint32(-1.0), u32::MAX);
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(!Value::Null.loose_eq(&Value::Number(0.0)));
        assert!(Value::Number(1.0).loose_eq(&Value::Bool(true)));
        assert!(Value::String("3".into()).loose_eq(&Value::Number(3.0)));
        assert!(!Value::Number(f64::NAN).loose_eq(&Value::Number(f64::NAN)));
        let arr = json!([4]);
        assert!(Value::from_json(&arr).loose_eq(&Value::Number(4.0)));
        let other = json!([4]);
        assert!(!Value::from_json(&arr).loose_eq(&Value::from_json(&other)));
        assert!(Value::from_json(&arr).loose_eq(&Value::from_json(&arr)));
    }

    #[test]
    fn test_number_strings() {
        assert_eq!(Value::Number(3.0).to_js_string(), "3");
        assert_eq!(Value::Number(-0.0).to_js_string(), "0");
        assert_eq!(Value::Number(2.5).to_js_string(), "2.5");
        let nested = json!([1, null, [2, 3]]);
        assert_eq!(Value::from_json(&nested).to_js_string(), "1,,2,3");
    }
}
