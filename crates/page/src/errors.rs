use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("html parse failed: {0}")]
    Parse(String),
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("page has no form")]
    NoForm,
    #[error("invalid selector: {0}")]
    Selector(String),
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("bad arguments for {method}: {reason}")]
    BadArguments { method: String, reason: String },
}
