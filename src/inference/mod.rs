//! Text and speech inference over local models.
//!
//! [`TextInferenceInterface`] and [`SpeechInferenceInterface`] own one loaded
//! model each and drive it through the backend traits in [`backend`]. The
//! default backends run on candle; [`mock`] has scripted doubles for tests.

pub mod backend;
pub mod candle;
mod error;
mod hardware;
pub mod mock;
pub mod runtime;
mod sampling;
mod speech;
mod stop;
mod stream;
mod text;

pub use backend::{Segment, SpeechBackend, SpeechModel, TextBackend, TextModel, Token};
pub use error::{InferenceError, Result};
pub use hardware::{ComputeDevice, HardwareCapabilities, HardwareDetector};
pub use sampling::SamplerChain;
pub use speech::{format_transcript, SpeechInference, SpeechInferenceInterface};
pub use stop::{StopOutcome, StopSequenceMatcher};
pub use stream::TokenStream;
pub use text::{decode_tokens_per_second, Completion, FinishReason, TextInference, TextInferenceInterface};
