use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_APP_ID: &str = "app";
const DEFAULT_UNMANAGED_ATTRIBUTE: &str = "data-unmanaged";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read runtime config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Id of the mount element.
    pub app_id: String,
    /// Emit a debug record for every dispatched event.
    #[serde(default)]
    pub debug: bool,
    /// Elements carrying this attribute are never touched by DOM patches.
    #[serde(default = "default_unmanaged_attribute")]
    pub unmanaged_attribute: String,
}

fn default_unmanaged_attribute() -> String {
    DEFAULT_UNMANAGED_ATTRIBUTE.to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_APP_ID)
    }
}

impl RuntimeConfig {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            debug: false,
            unmanaged_attribute: default_unmanaged_attribute(),
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Load from a YAML file, falling back to defaults when no path is given
    /// or the file does not exist.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                Self::from_yaml(&contents)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }
}
