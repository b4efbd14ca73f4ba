//! Seams between the inference interfaces and the model math.
//!
//! A backend turns load parameters into a loaded model; the interfaces own
//! the loaded model and drive it. The candle implementations live in
//! [`super::candle`], scripted doubles in [`super::mock`].

use crate::params::{SpeechGenerationParams, SpeechModelParams, TextModelParams};
use anyhow::Result;

/// Vocabulary index
pub type Token = u32;

/// A loaded language model and its vocabulary
pub trait TextModel: Send {
    /// Short description for logs and `model_info`
    fn describe(&self) -> String;

    fn vocab_size(&self) -> usize;

    /// Context window in tokens
    fn context_size(&self) -> usize;

    fn tokenize(&self, text: &str, add_bos: bool, parse_special: bool) -> Result<Vec<Token>>;

    /// Decodes tokens to text, skipping special tokens
    fn detokenize(&self, tokens: &[Token]) -> Result<String>;

    /// End-of-sequence or end-of-turn token
    fn is_end_of_generation(&self, token: Token) -> bool;

    /// Evaluates `tokens` at positions `pos..` and returns the logits of the
    /// last one. `pos == 0` starts a fresh sequence.
    fn forward(&mut self, tokens: &[Token], pos: usize) -> Result<Vec<f32>>;

    /// Pooled embedding for `tokens`
    fn embeddings(&mut self, tokens: &[Token]) -> Result<Vec<f32>>;
}

/// Factory for [`TextModel`]s
pub trait TextBackend: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, params: &TextModelParams) -> Result<Box<dyn TextModel>>;
}

/// One transcribed stretch of audio
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start_ms: i64,
    pub end_ms: i64,
    pub text: String,
    /// The next segment is spoken by someone else
    pub speaker_turn: bool,
}

impl Segment {
    pub fn new(start_ms: i64, end_ms: i64, text: impl Into<String>) -> Self {
        Self {
            start_ms,
            end_ms,
            text: text.into(),
            speaker_turn: false,
        }
    }
}

/// A loaded speech-recognition model
pub trait SpeechModel: Send {
    fn describe(&self) -> String;

    /// Transcribes 16 kHz mono PCM. Models that condition on earlier text
    /// keep that context between calls unless `params.no_context` is set.
    fn transcribe(&mut self, pcm: &[f32], params: &SpeechGenerationParams) -> Result<Vec<Segment>>;

    /// Forgets any text context carried between calls
    fn reset(&mut self) {}
}

/// Factory for [`SpeechModel`]s
pub trait SpeechBackend: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, params: &SpeechModelParams) -> Result<Box<dyn SpeechModel>>;
}
