//! Host configuration loaded from TOML.
//!
//! ```toml
//! [evaluator]
//! max_recursion_depth = 256
//! max_loop_iterations = 20
//!
//! [run]
//! timeout_ms = 30000
//!
//! [logging]
//! filter = "flowlisp=debug"
//! ansi = false
//!
//! [fixtures]
//! path = "fixtures/session.json"
//! ```
//!
//! Every section and field is optional.

use flowlisp::EvaluatorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub evaluator: EvaluatorConfig,
    pub run: RunConfig,
    pub logging: LoggingConfig,
    pub fixtures: FixturesConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Wall-clock budget for one script; unset means no limit
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is not set
    pub filter: String,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: "flowlisp=info,flowhost=info".to_string(),
            ansi: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixturesConfig {
    /// JSON file of canned bridge responses
    pub path: Option<PathBuf>,
}

impl FlowConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;

        // Relative fixture paths are resolved against the config file.
        if let (Some(fixtures), Some(dir)) = (&config.fixtures.path, path.parent()) {
            if fixtures.is_relative() {
                config.fixtures.path = Some(dir.join(fixtures));
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: FlowConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evaluator.max_recursion_depth == 0 {
            return Err(ConfigError::Invalid(
                "evaluator.max_recursion_depth must be at least 1".to_string(),
            ));
        }
        if self.evaluator.max_loop_iterations == 0 {
            return Err(ConfigError::Invalid(
                "evaluator.max_loop_iterations must be at least 1".to_string(),
            ));
        }
        if self.run.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("run.timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}
