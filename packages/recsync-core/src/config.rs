//! Session configuration.
//!
//! Supports TOML config files, environment variable overrides, and defaults.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::controller::DEFAULT_EVENT_CAPACITY;
use crate::error::{ConfigError, Result};
use crate::schema::EntitySchema;

/// Default push topic for record change notifications.
pub const DEFAULT_CHANNEL: &str = "/event/Ts_DataChange__e";

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

/// Configuration for one synchronization session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Push channel topic (default: "/event/Ts_DataChange__e")
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Capacity of the outcome event channel (default: 256)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Entity schema driving rows, drafts and notification filtering
    pub entity: EntitySchema,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            event_capacity: default_event_capacity(),
            entity: EntitySchema::account(),
        }
    }
}

impl SessionConfig {
    pub fn new(entity: EntitySchema) -> Self {
        Self {
            entity,
            ..Default::default()
        }
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration to a TOML file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), toml)
            .map_err(|e| ConfigError::Io(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Applies environment variable overrides.
    /// Environment variables are prefixed with `RECSYNC_`.
    /// Example: `RECSYNC_FIELDS=Name,Phone` overrides `entity.fields`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|var| env::var(var).ok())
    }

    /// Applies overrides from an arbitrary variable lookup, then revalidates.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(val) = lookup("RECSYNC_CHANNEL") {
            self.channel = val;
        }
        if let Some(val) = lookup("RECSYNC_ENTITY") {
            self.entity.name = val;
        }
        if let Some(val) = lookup("RECSYNC_FIELDS") {
            self.entity.fields = val
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(val) = lookup("RECSYNC_DISPLAY_FIELD") {
            self.entity.display_field = val;
        }
        if let Some(val) = lookup("RECSYNC_EVENT_CAPACITY") {
            self.event_capacity = val.parse().map_err(|_| ConfigError::InvalidOverride {
                var: "RECSYNC_EVENT_CAPACITY".to_string(),
                value: val.clone(),
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel.trim().is_empty() {
            return Err(ConfigError::InvalidSchema("channel topic is empty".to_string()).into());
        }
        self.entity.validate()?;
        Ok(())
    }
}
