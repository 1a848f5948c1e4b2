use std::path::Path;

use serde::Deserialize;

use crate::logging::RUNTIME_DIR;

/// Optional defaults at `.para-run/config.toml`. Anything given on the
/// command line wins over this file; the file wins over built-ins.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct ParaConfig {
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DisplayConfig {
    /// Starting content height of each pane.
    #[serde(default = "default_subwin_height")]
    pub subwin_height: u16,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            subwin_height: default_subwin_height(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct LoggingConfig {
    /// Store each task's output under `.para-run/logs/`.
    #[serde(default)]
    pub log_output: bool,
    /// Debug log verbosity; entries above this level are dropped.
    #[serde(default)]
    pub debug_level: u8,
}

fn default_subwin_height() -> u16 {
    5
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config.toml: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config.toml: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ParaConfig {
    pub fn load(base_dir: &Path) -> Result<Self, ConfigError> {
        let path = base_dir.join(RUNTIME_DIR).join("config.toml");
        let content = std::fs::read_to_string(&path)?;
        let config: ParaConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Missing file means defaults; a file that exists but does not parse is
    /// a startup error the caller must surface.
    pub fn load_or_default(base_dir: &Path) -> Result<Self, ConfigError> {
        match Self::load(base_dir) {
            Ok(config) => Ok(config),
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }
}
