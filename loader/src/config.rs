//! Session configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional
//! `zecompat.toml`, then the loader environment variables:
//!
//! | variable                     | field         |
//! |------------------------------|---------------|
//! | `ZE_ENABLE_NULL_DRIVER`      | `null_driver` |
//! | `ZE_ENABLE_VALIDATION_LAYER` | `validation`  |
//! | `ZE_ENABLE_API_TRACING`      | `trace_calls` |
//!
//! A variable counts as true only when set to exactly `"1"`.

use std::path::Path;

use log::LevelFilter;
use serde::Deserialize;

use crate::null_driver::NullDriverTopology;
use crate::result::ZeError;

/// Default config file name looked up by the CLI.
pub const CONFIG_FILE_NAME: &str = "zecompat.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SessionConfig {
    /// Register the in-process null driver ahead of any other driver.
    pub null_driver: bool,
    /// Reject objects this session never issued instead of forwarding them.
    pub validation: bool,
    /// Emit a trace event for every forwarded API call.
    pub trace_calls: bool,
    /// `error`, `warn`, `info`, `debug` or `trace`.
    pub log_level: Option<String>,
    pub null_driver_topology: NullDriverTopology,
}

impl SessionConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ZeError> {
        let config: SessionConfig = toml::from_str(content)
            .map_err(|e| ZeError::Config(format!("failed to parse {}: {}", CONFIG_FILE_NAME, e)))?;
        config.log_filter()?;
        Ok(config)
    }

    /// Read `path` if given, then apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ZeError> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| ZeError::Config(format!("failed to read {}: {}", path.display(), e)))?;
                Self::from_toml_str(&content)?
            }
            None => SessionConfig::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str| lookup(name).map(|value| value == "1");

        if let Some(on) = flag("ZE_ENABLE_NULL_DRIVER") {
            self.null_driver = on;
        }
        if let Some(on) = flag("ZE_ENABLE_VALIDATION_LAYER") {
            self.validation = on;
        }
        if let Some(on) = flag("ZE_ENABLE_API_TRACING") {
            self.trace_calls = on;
        }
    }

    /// The configured log level, if any.
    pub fn log_filter(&self) -> Result<Option<LevelFilter>, ZeError> {
        match self.log_level.as_deref() {
            None => Ok(None),
            Some(level) => level
                .parse::<LevelFilter>()
                .map(Some)
                .map_err(|_| ZeError::Config(format!("unknown log level '{}'", level))),
        }
    }
}
