//! Configuration management module
//!
//! Wraps the engine configuration with the settings only the CLI needs.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use controlsync_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

/// Environment variable overriding `engine.endpoint`.
pub const ENDPOINT_ENV: &str = "CONTROLSYNC_ENDPOINT";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    /// Base URL relative destinations resolve against when submitting.
    pub base_url: Option<String>,
    /// JSON file seeding the function registry globals.
    pub globals: Option<PathBuf>,
}

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = env::var(ENDPOINT_ENV) {
            let endpoint = endpoint.trim();
            if !endpoint.is_empty() {
                info!("Using endpoint from {}: {}", ENDPOINT_ENV, endpoint);
                self.engine.endpoint = endpoint.to_string();
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate().context("Invalid engine configuration")?;
        if let Some(base) = &self.base_url {
            Url::parse(base).with_context(|| format!("Invalid base_url: {base}"))?;
        }
        if self.engine.endpoint.contains("://") {
            Url::parse(&self.engine.endpoint)
                .with_context(|| format!("Invalid endpoint: {}", self.engine.endpoint))?;
        }
        Ok(())
    }

    /// Base URL for the HTTP transport: `base_url`, else an absolute endpoint.
    pub fn transport_base(&self) -> Result<Option<Url>> {
        if let Some(base) = &self.base_url {
            return Ok(Some(Url::parse(base)?));
        }
        if self.engine.endpoint.contains("://") {
            return Ok(Some(Url::parse(&self.engine.endpoint)?));
        }
        Ok(None)
    }
}
