use controlsync_codec::{CodecError, ScriptError};
use controlsync_core_types::SyncError;
use controlsync_page::PageError;
use controlsync_registry::RegistryError;
use controlsync_scheduler::{SchedulerError, TransportError};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("update refused: a blocking request is outstanding")]
    Blocked,
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("malformed command: {0}")]
    MalformedCommand(String),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<EngineError> for SyncError {
    fn from(value: EngineError) -> Self {
        SyncError::new(value.to_string())
    }
}
