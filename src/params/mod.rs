//! Load and generation parameters for the text and speech backends
//!
//! Plain value types: construct with `Default`/`new` plus `with_*` builders,
//! compare and hash them (float fields compare by bit pattern), and render
//! them with `Display` for logs and model introspection.

mod speech;
mod text;

pub use speech::{SpeechGenerationParams, SpeechModelParams};
pub use text::{GenerationParams, TextModelParams, MAX_CONTEXT_SIZE};

use thiserror::Error;

/// A parameter value outside its accepted range
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Invalid {field}: {reason}")]
pub struct ParamError {
    pub field: &'static str,
    pub reason: String,
}

impl ParamError {
    pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}
