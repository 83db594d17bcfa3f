use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::{Number, Value};

use crate::value::CodecValue;

/// A closure carried over the wire; invoked later through a script host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundFunction {
    pub code: String,
    pub params: Vec<String>,
}

impl BoundFunction {
    pub fn new(code: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            code: code.into(),
            params,
        }
    }

    pub fn into_codec(self) -> CodecValue {
        CodecValue::Closure {
            code: self.code,
            params: self.params,
        }
    }
}

/// Result of evaluating a codec value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Decoded {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Decoded>),
    Object(IndexMap<String, Decoded>),
    DateTime(DateTime<Utc>),
    Function(BoundFunction),
}

impl Decoded {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Decoded::Null,
            Value::Bool(b) => Decoded::Bool(*b),
            Value::Number(n) => Decoded::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Decoded::String(s.clone()),
            Value::Array(items) => Decoded::Array(items.iter().map(Decoded::from_json).collect()),
            Value::Object(map) => Decoded::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), Decoded::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Plain JSON view; undefined becomes null, dates become RFC 3339 strings
    /// and functions are re-encoded as closure nodes.
    pub fn to_json(&self) -> Value {
        match self {
            Decoded::Undefined | Decoded::Null => Value::Null,
            Decoded::Bool(b) => Value::Bool(*b),
            Decoded::Number(n) => number_to_json(*n),
            Decoded::String(s) => Value::String(s.clone()),
            Decoded::Array(items) => Value::Array(items.iter().map(Decoded::to_json).collect()),
            Decoded::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            Decoded::DateTime(instant) => {
                Value::String(instant.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Decoded::Function(function) => function.clone().into_codec().encode(),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Decoded::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Decoded::Undefined | Decoded::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Decoded::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Decoded::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Decoded> {
        match self {
            Decoded::Object(map) => map.get(key),
            Decoded::Array(items) => key.parse::<usize>().ok().and_then(|idx| items.get(idx)),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Decoded::Undefined | Decoded::Null => false,
            Decoded::Bool(b) => *b,
            Decoded::Number(n) => *n != 0.0 && !n.is_nan(),
            Decoded::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Text rendering used when a value is written into a control or attribute.
    pub fn to_text(&self) -> String {
        match self {
            Decoded::Undefined | Decoded::Null => String::new(),
            Decoded::String(s) => s.clone(),
            Decoded::Bool(b) => b.to_string(),
            Decoded::Number(_) => self.to_json().to_string(),
            Decoded::DateTime(instant) => instant.to_rfc3339_opts(SecondsFormat::Millis, true),
            other => other.to_json().to_string(),
        }
    }
}

impl From<&str> for Decoded {
    fn from(value: &str) -> Self {
        Decoded::String(value.to_string())
    }
}

impl From<String> for Decoded {
    fn from(value: String) -> Self {
        Decoded::String(value)
    }
}

impl From<f64> for Decoded {
    fn from(value: f64) -> Self {
        Decoded::Number(value)
    }
}

impl From<bool> for Decoded {
    fn from(value: bool) -> Self {
        Decoded::Bool(value)
    }
}

fn number_to_json(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integral_numbers_stay_integral() {
        let decoded = Decoded::from_json(&json!({"n": 3, "f": 1.5}));
        assert_eq!(decoded.to_json(), json!({"n": 3, "f": 1.5}));
    }

    #[test]
    fn undefined_renders_as_null_and_empty_text() {
        assert_eq!(Decoded::Undefined.to_json(), Value::Null);
        assert_eq!(Decoded::Undefined.to_text(), "");
        assert!(!Decoded::Undefined.is_truthy());
    }

    #[test]
    fn get_walks_objects_and_arrays() {
        let decoded = Decoded::from_json(&json!({"list": ["a", "b"]}));
        let list = decoded.get("list").unwrap();
        assert_eq!(list.get("1"), Some(&Decoded::from("b")));
        assert_eq!(list.get("9"), None);
    }
}
