use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use controlsync_registry::{builtins, FunctionRegistry};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

pub fn init_logging(level: &str, debug: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    // stdout carries command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.clone(),
        None => {
            // Priority: ./config/controlsync.yaml > ~/.config/controlsync/config.yaml
            let local_config = PathBuf::from("config/controlsync.yaml");
            if local_config.exists() {
                local_config
            } else {
                let mut path = dirs::config_dir().context("Failed to get config directory")?;
                path.push("controlsync");
                path.push("config.yaml");
                path
            }
        }
    };

    let mut config = if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .await
            .context("Failed to read config file")?;
        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;
        info!("Loaded configuration from: {}", config_path.display());
        config
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        Config::default()
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(LoadedConfig {
        config,
        path: config_path,
    })
}

/// Registry seeded with the builtins and, when given, a JSON globals file.
pub async fn build_registry(globals: Option<&Path>) -> Result<Arc<FunctionRegistry>> {
    let registry = match globals {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read globals file {}", path.display()))?;
            let value: Value = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse globals file {}", path.display()))?;
            debug!(path = %path.display(), "registry globals loaded");
            FunctionRegistry::with_globals(value)
        }
        None => FunctionRegistry::new(),
    };
    builtins::install(&registry);
    Ok(Arc::new(registry))
}

pub async fn read_input(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {what} {}", path.display()))
}
