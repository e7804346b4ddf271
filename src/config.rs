//! Command configuration
//!
//! Loaded from a TOML file: the owner identity, user-facing messages,
//! logging and the commands declared up front for handlers to bind to.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::command_registry::descriptor::Registration;
use crate::command_registry::interceptor::DEFAULT_INTERNAL_ERROR_MESSAGE;

fn default_owner() -> String {
    "command-forge".to_string()
}

fn default_internal_error_message() -> String {
    DEFAULT_INTERNAL_ERROR_MESSAGE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_slow_dispatch_ms() -> u64 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandConfig {
    /// Identity of the application owning the registered commands
    #[serde(default = "default_owner")]
    pub owner: String,
    /// Sent to a caller whose silent command failed
    #[serde(default = "default_internal_error_message")]
    pub internal_error_message: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Dispatches slower than this are logged as warnings
    #[serde(default = "default_slow_dispatch_ms")]
    pub slow_dispatch_ms: u64,
    /// Commands registered in the host table at startup
    #[serde(default)]
    pub commands: Vec<Registration>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            internal_error_message: default_internal_error_message(),
            log_level: default_log_level(),
            slow_dispatch_ms: default_slow_dispatch_ms(),
            commands: Vec::new(),
        }
    }
}

impl CommandConfig {
    /// Load the configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to load config file: {}", path.display()))
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML config")?;
        if config.owner.trim().is_empty() {
            anyhow::bail!("owner cannot be empty");
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Slow-dispatch threshold as a `Duration`
    pub fn slow_dispatch(&self) -> Duration {
        Duration::from_millis(self.slow_dispatch_ms)
    }
}
