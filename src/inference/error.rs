use crate::audio::AudioError;
use crate::params::ParamError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by every text and speech interface operation.
///
/// Load failures leave the interface unloaded so callers can retry with
/// different parameters. Hosts that prefer in-band text can render any error
/// with [`InferenceError::sentinel`].
#[derive(Debug, Error)]
pub enum InferenceError {
    /// No model is loaded on this interface
    #[error("Model not loaded")]
    ModelNotLoaded,

    /// A parameter is outside its accepted range
    #[error(transparent)]
    InvalidParams(#[from] ParamError),

    /// The backend could not load the model
    #[error("Failed to load model from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("Empty prompt")]
    EmptyPrompt,

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    /// The prompt does not fit into the context window
    #[error("Context size exceeded: prompt has {prompt_tokens} tokens, context holds {context_size}")]
    ContextExceeded {
        prompt_tokens: usize,
        context_size: usize,
    },

    /// Embeddings were requested from a model loaded without them
    #[error("Model was not loaded with embeddings enabled")]
    EmbeddingsDisabled,

    #[error("No audio samples to transcribe")]
    EmptyAudio,

    /// The audio decode boundary failed or produced no frames
    #[error("Failed to load audio file: {0}")]
    Audio(#[from] AudioError),

    /// The streaming callback asked generation to stop
    #[error("Generation cancelled after {tokens_generated} tokens")]
    Cancelled { tokens_generated: usize },

    /// The model backend failed mid-operation
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InferenceError {
    pub(crate) fn backend(err: anyhow::Error) -> Self {
        InferenceError::Backend(format!("{:#}", err))
    }

    pub(crate) fn load_failed(path: impl Into<PathBuf>, err: anyhow::Error) -> Self {
        InferenceError::LoadFailed {
            path: path.into(),
            message: format!("{:#}", err),
        }
    }

    /// In-band marker text for this error, e.g. `[Error: Model not loaded]`
    pub fn sentinel(&self) -> String {
        format!("[Error: {}]", self)
    }

    pub fn is_model_not_loaded(&self) -> bool {
        matches!(self, InferenceError::ModelNotLoaded)
    }
}

pub type Result<T> = std::result::Result<T, InferenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_strings() {
        assert_eq!(
            InferenceError::ModelNotLoaded.sentinel(),
            "[Error: Model not loaded]"
        );
        assert_eq!(InferenceError::EmptyPrompt.sentinel(), "[Error: Empty prompt]");
        assert!(InferenceError::ContextExceeded {
            prompt_tokens: 10,
            context_size: 8
        }
        .sentinel()
        .starts_with("[Error: Context size exceeded"));
    }

    #[test]
    fn test_param_error_is_transparent() {
        let err: InferenceError = ParamError::new("top_p", "1.5 is outside 0..=1").into();
        assert_eq!(err.to_string(), "Invalid top_p: 1.5 is outside 0..=1");
    }

    #[test]
    fn test_backend_error_keeps_context_chain() {
        let err = anyhow::anyhow!("inner").context("outer");
        assert_eq!(
            InferenceError::backend(err).to_string(),
            "Backend error: outer: inner"
        );
    }
}
