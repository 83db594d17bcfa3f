use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Destination for updates. Empty means the form's `action`.
    pub endpoint: String,
    /// Action queue debounce window.
    pub debounce_ms: u64,
    pub request_timeout_ms: u64,
    /// When false every request is a full resync.
    pub change_events: bool,
    /// Suffix of the wrapper element enclosing a control.
    pub wrapper_suffix: String,
    /// Attribute linking annotation elements to a control (`#id`).
    pub related_attribute: String,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            debounce_ms: 10,
            request_timeout_ms: 30_000,
            change_events: true,
            wrapper_suffix: "_ctl".to_string(),
            related_attribute: "data-rel".to_string(),
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.request_timeout_ms == 0 {
            return Err(EngineError::Config("request_timeout_ms must be positive".into()));
        }
        if self.wrapper_suffix.is_empty() {
            return Err(EngineError::Config("wrapper_suffix must not be empty".into()));
        }
        if self.related_attribute.trim().is_empty() {
            return Err(EngineError::Config("related_attribute must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_style_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"endpoint": "/sync", "change_events": false}"#).unwrap();
        assert_eq!(config.endpoint, "/sync");
        assert!(!config.change_events);
        assert_eq!(config.wrapper_suffix, "_ctl");
        assert_eq!(config.debounce(), Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = EngineConfig {
            request_timeout_ms: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }
}
