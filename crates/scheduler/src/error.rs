use std::time::Duration;

use controlsync_core_types::SyncError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("request queue worker stopped")]
    Closed,
}

impl From<SchedulerError> for SyncError {
    fn from(value: SchedulerError) -> Self {
        SyncError::new(value.to_string())
    }
}

/// Failure of one exchange. Every variant reaches the error callback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server responded with status {status}")]
    Status { status: u16, body: String },
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("invalid destination: {0}")]
    InvalidDestination(String),
    /// The transport answered but the body was unusable.
    #[error("malformed response: {0}")]
    Malformed(String),
}
