use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("malformed {kind} value: {reason}")]
    Malformed { kind: &'static str, reason: String },
    #[error("invalid date fields: {0}")]
    InvalidDate(String),
    #[error("unknown function: {path}")]
    UnknownFunction { path: String },
    #[error("unknown path: {path}")]
    UnknownPath { path: String },
    #[error("call to {func} failed: {message}")]
    Invocation { func: String, message: String },
}

impl CodecError {
    pub(crate) fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            kind,
            reason: reason.into(),
        }
    }
}

/// Failure reported by a script host while evaluating text or calling a closure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("script error: {0}")]
pub struct ScriptError(pub String);

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
