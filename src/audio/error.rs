use std::path::PathBuf;
use thiserror::Error;

/// Failures at the audio decode boundary
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("Unsupported audio format {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    /// Decoding succeeded but produced no frames
    #[error("{path} contains no audio frames")]
    Empty { path: PathBuf },
}
