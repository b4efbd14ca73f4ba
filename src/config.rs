//! Configuration management for hearth
//!
//! Settings come from environment variables with defaults, optionally
//! overlaid with a YAML file.
//!
//! # Environment Variables
//!
//! - `HEARTH_MODELS_DIR`: base directory for relative model file names - default: "./models"
//! - `HEARTH_CONFIG`: YAML configuration file - default: `<config dir>/hearth/config.yaml`
//! - `HEARTH_LOG_LEVEL`: logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use hearth::config::HearthConfig;
//!
//! # fn example() -> Result<(), hearth::config::ConfigError> {
//! let config = HearthConfig::load()?;
//! config.validate()?;
//!
//! let path = config.resolve_model_path("llama-3.2-1b-q4_k_m.gguf");
//! println!("{}", path.display());
//! # Ok(())
//! # }
//! ```

use crate::params::{
    GenerationParams, SpeechGenerationParams, SpeechModelParams, TextModelParams, MAX_CONTEXT_SIZE,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_MODELS_DIR: &str = "./models";
const DEFAULT_LOG_LEVEL: &str = "info";
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Top-level configuration for hearth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HearthConfig {
    /// Directory relative model file names are resolved against
    pub models_dir: PathBuf,

    /// Where this configuration is loaded from and saved to
    #[serde(skip)]
    pub config_file: PathBuf,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    pub text_model: TextModelParams,
    pub generation: GenerationParams,
    pub speech_model: SpeechModelParams,
    pub speech_generation: SpeechGenerationParams,
}

impl Default for HearthConfig {
    /// Loads from environment variables, falling back to defaults
    fn default() -> Self {
        let models_dir = env::var("HEARTH_MODELS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_MODELS_DIR));

        let config_file = env::var("HEARTH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_file());

        let log_level = env::var("HEARTH_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            models_dir,
            config_file,
            log_level,
            text_model: TextModelParams::default(),
            generation: GenerationParams::default(),
            speech_model: SpeechModelParams::default(),
            speech_generation: SpeechGenerationParams::default(),
        }
    }
}

fn default_config_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hearth")
        .join(CONFIG_FILE_NAME)
}

impl HearthConfig {
    /// Environment defaults overlaid with the config file, if one exists
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let path = defaults.config_file.clone();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(defaults)
        }
    }

    /// Reads `path`; fields missing from the file keep their defaults.
    /// Environment variables take precedence over the file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: HearthConfig =
            serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        config.config_file = path.to_path_buf();
        if let Ok(dir) = env::var("HEARTH_MODELS_DIR") {
            config.models_dir = PathBuf::from(dir);
        }
        if let Ok(level) = env::var("HEARTH_LOG_LEVEL") {
            config.log_level = level;
        }
        config.log_level = config.log_level.to_lowercase();
        Ok(config)
    }

    /// Writes the configuration to `config_file`, creating parent directories
    pub fn save(&self) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.config_file.clone(),
            source,
        };
        if let Some(parent) = self.config_file.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_yaml::to_string(self).map_err(|e| ConfigError::Parse {
            path: self.config_file.clone(),
            message: e.to_string(),
        })?;
        fs::write(&self.config_file, text).map_err(io_err)
    }

    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        if self.text_model.n_ctx == 0 || self.text_model.n_ctx > MAX_CONTEXT_SIZE {
            return Err(ConfigError::ValidationFailed(format!(
                "Context size must be between 1 and {}",
                MAX_CONTEXT_SIZE
            )));
        }

        self.generation
            .validate()
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;

        self.speech_generation
            .validate()
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;

        Ok(())
    }

    /// Joins a relative model file name onto `models_dir`
    pub fn resolve_model_path(&self, file_name: impl AsRef<Path>) -> PathBuf {
        let file = file_name.as_ref();
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.models_dir.join(file)
        }
    }
}

impl fmt::Display for HearthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Hearth Configuration:")?;
        writeln!(f, "  Models Dir: {}", self.models_dir.display())?;
        writeln!(f, "  Config File: {}", self.config_file.display())?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        writeln!(f, "  Context Size: {}", self.text_model.n_ctx)?;
        writeln!(f, "  GPU Layers: {}", self.text_model.n_gpu_layers)?;
        writeln!(
            f,
            "  Sampling: temperature={}, top_k={}, top_p={}",
            self.generation.temperature, self.generation.top_k, self.generation.top_p
        )?;
        writeln!(f, "  Speech Language: {}", self.speech_model.language)?;
        Ok(())
    }
}
