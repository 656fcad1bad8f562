//! Configuration loading
//!
//! Reads a TOML file (or starts from the development preset), applies
//! `WAGERPOOL_*` environment overrides and validates the result.

use crate::config::WagerConfig;
use crate::errors::{ConfigurationError, WagerResult};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> WagerResult<WagerConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => WagerConfig::development(),
        };

        apply_overrides(&mut config, |key| env::var(key).ok())?;

        config
            .validate()
            .map_err(|e| ConfigurationError::ValidationFailed(e.to_string()))?;

        tracing::debug!(path = ?self.config_path, "configuration loaded");
        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> WagerResult<WagerConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to file
    pub fn save(&self, config: &WagerConfig, path: &str) -> WagerResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

fn parse_override<T: FromStr>(key: &str, raw: String, reason: &str) -> Result<T, ConfigurationError> {
    raw.parse().map_err(|_| ConfigurationError::InvalidValue {
        field: key.to_string(),
        value: raw,
        reason: reason.to_string(),
    })
}

/// Applies overrides read through `lookup`
pub fn apply_overrides(
    config: &mut WagerConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigurationError> {
    if let Some(host) = lookup("WAGERPOOL_API_HOST") {
        config.api.host = host;
    }
    if let Some(port) = lookup("WAGERPOOL_API_PORT") {
        config.api.port = parse_override("WAGERPOOL_API_PORT", port, "Invalid port number")?;
    }
    if let Some(data_dir) = lookup("WAGERPOOL_DATA_DIR") {
        config.storage.data_directory = data_dir;
        config.storage.enabled = true;
    }
    if let Some(cooldown) = lookup("WAGERPOOL_REFUND_COOLDOWN_SECS") {
        config.engine.refund_cooldown_secs =
            parse_override("WAGERPOOL_REFUND_COOLDOWN_SECS", cooldown, "Invalid number of seconds")?;
    }
    Ok(())
}
