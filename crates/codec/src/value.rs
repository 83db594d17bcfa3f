use chrono::{DateTime, Datelike, Timelike, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::errors::CodecError;

/// Key that marks a JSON object as a tagged codec node.
pub const TAG_KEY: &str = "objType";

pub const TAG_CLOSURE: &str = "closure";
pub const TAG_DATETIME: &str = "datetime";
pub const TAG_VARREF: &str = "varref";
pub const TAG_CALL: &str = "call";

/// Calendar fields of a date/time node. Months are zero-based on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFields {
    pub y: i32,
    pub mo: u32,
    pub d: u32,
    #[serde(default)]
    pub h: u32,
    #[serde(default)]
    pub mi: u32,
    #[serde(default)]
    pub s: u32,
    #[serde(default)]
    pub ms: u32,
    #[serde(default)]
    pub utc: bool,
}

impl From<DateTime<Utc>> for DateFields {
    fn from(value: DateTime<Utc>) -> Self {
        Self {
            y: value.year(),
            mo: value.month0(),
            d: value.day(),
            h: value.hour(),
            mi: value.minute(),
            s: value.second(),
            ms: value.timestamp_subsec_millis(),
            utc: true,
        }
    }
}

/// Typed form of everything that can travel through the object protocol.
#[derive(Clone, Debug, PartialEq)]
pub enum CodecValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<CodecValue>),
    Object(IndexMap<String, CodecValue>),
    Closure {
        code: String,
        params: Vec<String>,
    },
    /// `None` is the null-date sentinel.
    DateTime(Option<DateFields>),
    VarRef {
        path: String,
    },
    Call {
        func: String,
        context: Option<String>,
        params: Vec<CodecValue>,
    },
}

impl CodecValue {
    pub fn parse(value: &Value) -> Result<Self, CodecError> {
        Ok(match value {
            Value::Null => CodecValue::Null,
            Value::Bool(b) => CodecValue::Bool(*b),
            Value::Number(n) => CodecValue::Number(n.clone()),
            Value::String(s) => CodecValue::String(s.clone()),
            Value::Array(items) => CodecValue::Array(
                items
                    .iter()
                    .map(CodecValue::parse)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::Object(map) => match map.get(TAG_KEY).and_then(Value::as_str) {
                Some(TAG_CLOSURE) => parse_closure(map)?,
                Some(TAG_DATETIME) => parse_datetime(map)?,
                Some(TAG_VARREF) => CodecValue::VarRef {
                    path: required_str(map, TAG_VARREF, "path")?,
                },
                Some(TAG_CALL) => parse_call(map)?,
                _ => CodecValue::Object(
                    map.iter()
                        .map(|(key, value)| Ok((key.clone(), CodecValue::parse(value)?)))
                        .collect::<Result<IndexMap<_, _>, CodecError>>()?,
                ),
            },
        })
    }

    pub fn encode(&self) -> Value {
        match self {
            CodecValue::Null => Value::Null,
            CodecValue::Bool(b) => Value::Bool(*b),
            CodecValue::Number(n) => Value::Number(n.clone()),
            CodecValue::String(s) => Value::String(s.clone()),
            CodecValue::Array(items) => Value::Array(items.iter().map(CodecValue::encode).collect()),
            CodecValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.encode()))
                    .collect(),
            ),
            CodecValue::Closure { code, params } => tagged(
                TAG_CLOSURE,
                [
                    ("code", Value::String(code.clone())),
                    (
                        "params",
                        Value::Array(params.iter().cloned().map(Value::String).collect()),
                    ),
                ],
            ),
            CodecValue::DateTime(None) => tagged(TAG_DATETIME, [("null", Value::Bool(true))]),
            CodecValue::DateTime(Some(fields)) => {
                let mut out = Map::new();
                out.insert(TAG_KEY.into(), Value::String(TAG_DATETIME.into()));
                if let Ok(Value::Object(map)) = serde_json::to_value(fields) {
                    out.extend(map);
                }
                Value::Object(out)
            }
            CodecValue::VarRef { path } => {
                tagged(TAG_VARREF, [("path", Value::String(path.clone()))])
            }
            CodecValue::Call {
                func,
                context,
                params,
            } => {
                let mut out = Map::new();
                out.insert(TAG_KEY.into(), Value::String(TAG_CALL.into()));
                out.insert("func".into(), Value::String(func.clone()));
                if let Some(context) = context {
                    out.insert("context".into(), Value::String(context.clone()));
                }
                out.insert(
                    "params".into(),
                    Value::Array(params.iter().map(CodecValue::encode).collect()),
                );
                Value::Object(out)
            }
        }
    }

    /// Wraps an untagged JSON value without interpreting any `objType` keys.
    pub fn literal(value: &Value) -> Self {
        match value {
            Value::Null => CodecValue::Null,
            Value::Bool(b) => CodecValue::Bool(*b),
            Value::Number(n) => CodecValue::Number(n.clone()),
            Value::String(s) => CodecValue::String(s.clone()),
            Value::Array(items) => CodecValue::Array(items.iter().map(CodecValue::literal).collect()),
            Value::Object(map) => CodecValue::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), CodecValue::literal(value)))
                    .collect(),
            ),
        }
    }

    pub fn is_tagged(&self) -> bool {
        matches!(
            self,
            CodecValue::Closure { .. }
                | CodecValue::DateTime(_)
                | CodecValue::VarRef { .. }
                | CodecValue::Call { .. }
        )
    }
}

impl From<DateTime<Utc>> for CodecValue {
    fn from(value: DateTime<Utc>) -> Self {
        CodecValue::DateTime(Some(DateFields::from(value)))
    }
}

impl From<&str> for CodecValue {
    fn from(value: &str) -> Self {
        CodecValue::String(value.to_string())
    }
}

impl From<bool> for CodecValue {
    fn from(value: bool) -> Self {
        CodecValue::Bool(value)
    }
}

impl From<i64> for CodecValue {
    fn from(value: i64) -> Self {
        CodecValue::Number(value.into())
    }
}

fn tagged<const N: usize>(tag: &str, fields: [(&str, Value); N]) -> Value {
    let mut out = Map::new();
    out.insert(TAG_KEY.into(), Value::String(tag.into()));
    for (key, value) in fields {
        out.insert(key.into(), value);
    }
    Value::Object(out)
}

fn required_str(map: &Map<String, Value>, kind: &'static str, key: &str) -> Result<String, CodecError> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CodecError::malformed(kind, format!("missing string field `{key}`")))
}

fn parse_closure(map: &Map<String, Value>) -> Result<CodecValue, CodecError> {
    let code = required_str(map, TAG_CLOSURE, "code")?;
    let params = match map.get("params") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| CodecError::malformed(TAG_CLOSURE, "parameter names must be strings"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(CodecError::malformed(TAG_CLOSURE, "`params` must be an array")),
    };
    Ok(CodecValue::Closure { code, params })
}

fn parse_datetime(map: &Map<String, Value>) -> Result<CodecValue, CodecError> {
    if map.get("null").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(CodecValue::DateTime(None));
    }
    let mut fields = map.clone();
    fields.remove(TAG_KEY);
    let fields: DateFields = serde_json::from_value(Value::Object(fields))
        .map_err(|err| CodecError::malformed(TAG_DATETIME, err.to_string()))?;
    Ok(CodecValue::DateTime(Some(fields)))
}

fn parse_call(map: &Map<String, Value>) -> Result<CodecValue, CodecError> {
    let func = required_str(map, TAG_CALL, "func")?;
    let context = match map.get("context") {
        None | Some(Value::Null) => None,
        Some(Value::String(context)) => Some(context.clone()),
        Some(_) => return Err(CodecError::malformed(TAG_CALL, "`context` must be a string")),
    };
    let params = match map.get("params") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(CodecValue::parse)
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(CodecError::malformed(TAG_CALL, "`params` must be an array")),
    };
    Ok(CodecValue::Call {
        func,
        context,
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn plain_json_parses_structurally() {
        let value = CodecValue::parse(&json!({"a": [1, "x", null], "b": true})).unwrap();
        let CodecValue::Object(map) = value else {
            panic!("expected object");
        };
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map["b"], CodecValue::Bool(true));
    }

    #[test]
    fn tagged_nodes_parse_into_variants() {
        let value = CodecValue::parse(&json!({
            "objType": "call",
            "func": "fmt.upper",
            "context": "app",
            "params": [{"objType": "varref", "path": "app.name"}]
        }))
        .unwrap();
        assert_eq!(
            value,
            CodecValue::Call {
                func: "fmt.upper".into(),
                context: Some("app".into()),
                params: vec![CodecValue::VarRef {
                    path: "app.name".into()
                }],
            }
        );
    }

    #[test]
    fn null_date_sentinel() {
        let value = CodecValue::parse(&json!({"objType": "datetime", "null": true})).unwrap();
        assert_eq!(value, CodecValue::DateTime(None));
        assert_eq!(value.encode(), json!({"objType": "datetime", "null": true}));
    }

    #[test]
    fn encoded_date_uses_zero_based_month() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 31, 8, 30, 0).unwrap();
        let encoded = CodecValue::from(instant).encode();
        assert_eq!(encoded["objType"], json!("datetime"));
        assert_eq!(encoded["mo"], json!(0));
        assert_eq!(encoded["d"], json!(31));
        assert_eq!(encoded["utc"], json!(true));
        assert_eq!(CodecValue::parse(&encoded).unwrap(), CodecValue::from(instant));
    }

    #[test]
    fn malformed_call_is_rejected() {
        let err = CodecValue::parse(&json!({"objType": "call", "params": []})).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { kind: "call", .. }));
    }

    #[test]
    fn unknown_tag_stays_a_plain_object() {
        let value = CodecValue::parse(&json!({"objType": "other", "x": 1})).unwrap();
        assert!(matches!(value, CodecValue::Object(_)));
        assert!(!value.is_tagged());
    }
}
