use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Shared error type for the controlsync crates.
#[derive(Debug, Error, Clone)]
pub enum SyncError {
    #[error("{message}")]
    Message { message: String },
}

impl SyncError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

/// Stable identifier of a server-managed control.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(pub String);

impl ControlId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier of the wrapper element that encloses this control.
    pub fn wrapper(&self, suffix: &str) -> String {
        format!("{}{}", self.0, suffix)
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ControlId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ControlId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Server-side event number bound to a control action.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u32);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Submission path of an update.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    /// Triggered by the user; subject to the block flag.
    #[default]
    Interactive,
    /// Program-initiated; never refused by the block flag.
    Background,
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallType::Interactive => f.write_str("interactive"),
            CallType::Background => f.write_str("background"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapper_id_appends_suffix() {
        let id = ControlId::new("c12");
        assert_eq!(id.wrapper("_ctl"), "c12_ctl");
    }

    #[test]
    fn call_type_serializes_lowercase() {
        let encoded = serde_json::to_string(&CallType::Background).unwrap();
        assert_eq!(encoded, "\"background\"");
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }
}
