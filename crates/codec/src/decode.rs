use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::decoded::{BoundFunction, Decoded};
use crate::errors::CodecError;
use crate::host::Scope;
use crate::value::{CodecValue, DateFields};

/// Error raised at one node of a decoded tree.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeError {
    /// Location in the tree, rooted at `$`.
    pub path: String,
    pub error: CodecError,
}

/// Outcome of evaluating a tree: the value plus every contained node failure.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodeReport {
    pub value: Decoded,
    pub errors: Vec<NodeError>,
}

impl DecodeReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<Decoded, NodeError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.value),
        }
    }
}

/// Interpreter for codec trees.
///
/// Evaluation is depth-first and left to right. A failing node becomes
/// [`Decoded::Undefined`] and its error is recorded; siblings still evaluate.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObjectCodec;

impl ObjectCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, value: &Value) -> Result<CodecValue, CodecError> {
        CodecValue::parse(value)
    }

    pub fn encode(&self, value: &CodecValue) -> Value {
        value.encode()
    }

    pub fn decode(&self, value: &CodecValue, scope: &dyn Scope) -> DecodeReport {
        let mut errors = Vec::new();
        let value = self.eval(value, scope, "$", &mut errors);
        if !errors.is_empty() {
            debug!(failures = errors.len(), "decode finished with contained errors");
        }
        DecodeReport { value, errors }
    }

    /// Parses and decodes in one step. A parse failure yields an undefined
    /// root with the parse error recorded at `$`.
    pub fn decode_json(&self, value: &Value, scope: &dyn Scope) -> DecodeReport {
        match CodecValue::parse(value) {
            Ok(parsed) => self.decode(&parsed, scope),
            Err(error) => DecodeReport {
                value: Decoded::Undefined,
                errors: vec![NodeError {
                    path: "$".into(),
                    error,
                }],
            },
        }
    }

    /// Decodes a parameter list, reporting paths relative to `params`.
    pub fn decode_params(&self, params: &[CodecValue], scope: &dyn Scope) -> (Vec<Decoded>, Vec<NodeError>) {
        let mut errors = Vec::new();
        let values = params
            .iter()
            .enumerate()
            .map(|(idx, param)| self.eval(param, scope, &format!("params[{idx}]"), &mut errors))
            .collect();
        (values, errors)
    }

    fn eval(&self, value: &CodecValue, scope: &dyn Scope, path: &str, errors: &mut Vec<NodeError>) -> Decoded {
        match value {
            CodecValue::Null => Decoded::Null,
            CodecValue::Bool(b) => Decoded::Bool(*b),
            CodecValue::Number(n) => Decoded::Number(n.as_f64().unwrap_or(f64::NAN)),
            CodecValue::String(s) => Decoded::String(s.clone()),
            CodecValue::Array(items) => Decoded::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| self.eval(item, scope, &format!("{path}[{idx}]"), errors))
                    .collect(),
            ),
            CodecValue::Object(map) => Decoded::Object(
                map.iter()
                    .map(|(key, item)| {
                        let value = self.eval(item, scope, &format!("{path}.{key}"), errors);
                        (key.clone(), value)
                    })
                    .collect::<IndexMap<_, _>>(),
            ),
            CodecValue::Closure { code, params } => {
                Decoded::Function(BoundFunction::new(code.clone(), params.clone()))
            }
            CodecValue::DateTime(None) => Decoded::Null,
            CodecValue::DateTime(Some(fields)) => match to_instant(fields) {
                Ok(instant) => Decoded::DateTime(instant),
                Err(error) => fail(path, error, errors),
            },
            CodecValue::VarRef { path: var } => scope.resolve_value(var).unwrap_or_default(),
            CodecValue::Call {
                func,
                context,
                params,
            } => {
                let args = params
                    .iter()
                    .enumerate()
                    .map(|(idx, param)| {
                        self.eval(param, scope, &format!("{path}.params[{idx}]"), errors)
                    })
                    .collect::<Vec<_>>();
                match scope.call(func, context.as_deref(), args) {
                    Ok(result) => result,
                    Err(error) => fail(path, error, errors),
                }
            }
        }
    }
}

fn fail(path: &str, error: CodecError, errors: &mut Vec<NodeError>) -> Decoded {
    warn!(%path, %error, "codec node failed");
    errors.push(NodeError {
        path: path.to_string(),
        error,
    });
    Decoded::Undefined
}

fn to_instant(fields: &DateFields) -> Result<DateTime<Utc>, CodecError> {
    let naive = fields
        .mo
        .checked_add(1)
        .and_then(|month| NaiveDate::from_ymd_opt(fields.y, month, fields.d))
        .and_then(|date| date.and_hms_milli_opt(fields.h, fields.mi, fields.s, fields.ms))
        .ok_or_else(|| CodecError::InvalidDate(format!("{fields:?}")))?;
    if fields.utc {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| CodecError::InvalidDate(format!("{fields:?} does not exist in local time")))
}
