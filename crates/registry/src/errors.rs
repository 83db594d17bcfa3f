use controlsync_codec::CodecError;
use controlsync_core_types::SyncError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown function: {path}")]
    UnknownFunction { path: String },
    #[error("unknown path: {path}")]
    UnknownPath { path: String },
    #[error("{func} failed: {message}")]
    Invocation { func: String, message: String },
}

impl RegistryError {
    pub fn into_sync_error(self, detail: impl Into<String>) -> SyncError {
        SyncError::new(format!("{}: {}", self, detail.into()))
    }
}

impl From<RegistryError> for CodecError {
    fn from(value: RegistryError) -> Self {
        match value {
            RegistryError::UnknownFunction { path } => CodecError::UnknownFunction { path },
            RegistryError::UnknownPath { path } => CodecError::UnknownPath { path },
            RegistryError::Invocation { func, message } => CodecError::Invocation { func, message },
        }
    }
}
