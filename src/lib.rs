//! hearth - local inference engine for quantized text and speech models
//!
//! Runs GGUF language models and Whisper speech models on the local machine,
//! keeps key material in locked and wiped memory, and benchmarks candidate
//! models against each other.
//!
//! # Core Concepts
//!
//! - **Interfaces**: [`inference::TextInferenceInterface`] and
//!   [`inference::SpeechInferenceInterface`] each own at most one loaded model
//! - **Backends**: the model runtime behind an interface, candle by default,
//!   swappable through [`inference::TextBackend`] / [`inference::SpeechBackend`]
//! - **Service**: [`AIService`] fronts one text and one speech interface
//! - **Secure memory**: [`secure`] buffers that are page-locked, guarded and
//!   zeroed on drop, plus Argon2id key derivation
//!
//! # Example Usage
//!
//! ```no_run
//! use hearth::params::{GenerationParams, TextModelParams};
//! use hearth::AIService;
//!
//! # fn example() -> Result<(), hearth::inference::InferenceError> {
//! AIService::init();
//!
//! let mut service = AIService::new();
//! service.load_text_model(TextModelParams::new("models/qwen2.5-0.5b-q4_k_m.gguf"))?;
//!
//! let completion = service.generate_completion("Hello", &GenerationParams::default())?;
//! println!("{}", completion.text);
//!
//! drop(service);
//! AIService::shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`secure`]: locked buffers, secure strings and keys, key derivation
//! - [`params`]: load and generation parameter sets
//! - [`inference`]: interfaces, backends and the process-wide runtime
//! - [`audio`]: audio decoding, voice activity detection, streaming windows
//! - [`service`]: the [`AIService`] facade
//! - [`benchmark`]: model catalog, timing statistics and reports
//! - [`config`], [`util`]: configuration and logging set-up

pub mod audio;
pub mod benchmark;
pub mod config;
pub mod inference;
pub mod params;
pub mod secure;
pub mod service;
pub mod util;

pub use config::{ConfigError, HearthConfig};
pub use inference::{InferenceError, SpeechInferenceInterface, TextInferenceInterface};
pub use service::AIService;
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_hearth() {
        assert_eq!(NAME, "hearth");
    }
}
