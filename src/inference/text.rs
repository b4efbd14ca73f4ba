//! Text generation over a loaded language model.
//!
//! [`TextInferenceInterface`] owns at most one loaded model. Every operation
//! returns a [`Result`]; calling anything but `load_model` while unloaded
//! yields [`InferenceError::ModelNotLoaded`].
//!
//! # Example
//!
//! ```no_run
//! use hearth::inference::{TextInference, TextInferenceInterface};
//! use hearth::params::{GenerationParams, TextModelParams};
//!
//! # fn example() -> Result<(), hearth::inference::InferenceError> {
//! let mut llm = TextInferenceInterface::new();
//! llm.load_model(TextModelParams::new("models/llama-3.2-1b-q4_k_m.gguf"))?;
//!
//! let params = GenerationParams::default().with_max_tokens(64);
//! let completion = llm.generate_completion("The capital of France is", &params)?;
//! println!("{} ({:.1} tok/s)", completion.text, completion.decode_tokens_per_second());
//!
//! llm.generate_completion_streaming("Once upon a time", &params, &mut |piece| {
//!     print!("{}", piece);
//!     true
//! })?;
//! # Ok(())
//! # }
//! ```

use super::backend::{TextBackend, TextModel, Token};
use super::candle::CandleTextBackend;
use super::error::{InferenceError, Result};
use super::runtime::RuntimeHandle;
use super::sampling::SamplerChain;
use super::stop::{StopOutcome, StopSequenceMatcher};
use super::stream::TokenStream;
use crate::params::{GenerationParams, TextModelParams};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Why generation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// `n_predict` tokens were produced
    Length,
    /// A stop sequence matched
    StopSequence,
    /// The model emitted an end-of-generation token
    EndOfGeneration,
    /// The context window filled up
    ContextFull,
}

/// Output of one generation call plus its timing side-channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub text: String,
    /// From the start of the call until the first token was sampled
    pub time_to_first_token_ms: f64,
    /// From the first sampled token until generation ended
    pub decode_duration_ms: f64,
    pub tokens_generated: usize,
    pub finish_reason: FinishReason,
}

impl Completion {
    /// Decode throughput; 0 when the decode duration is not positive
    pub fn decode_tokens_per_second(&self) -> f64 {
        decode_tokens_per_second(self.tokens_generated, self.decode_duration_ms)
    }
}

/// `tokens * 1000 / decode_ms`, or 0 when `decode_ms <= 0`
pub fn decode_tokens_per_second(tokens: usize, decode_ms: f64) -> f64 {
    if decode_ms > 0.0 {
        tokens as f64 * 1000.0 / decode_ms
    } else {
        0.0
    }
}

/// Operations a host or orchestrator can perform on a text model.
///
/// Not internally synchronised: one caller at a time.
pub trait TextInference: Send {
    /// Loads a model, unloading any current one first. On error the
    /// interface is left unloaded.
    fn load_model(&mut self, params: TextModelParams) -> Result<()>;

    /// Releases the model. Idempotent.
    fn unload_model(&mut self);

    fn is_model_loaded(&self) -> bool;

    /// Tokenizes without adding a beginning-of-sequence token
    fn tokenize(&self, text: &str) -> Result<Vec<Token>>;

    fn detokenize(&self, tokens: &[Token]) -> Result<String>;

    fn generate_completion(&mut self, prompt: &str, params: &GenerationParams)
        -> Result<Completion>;

    /// Same loop as [`generate_completion`](Self::generate_completion), but
    /// each text fragment is passed to `on_token` before continuing. Returning
    /// `false` cancels with [`InferenceError::Cancelled`].
    fn generate_completion_streaming(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        on_token: &mut dyn FnMut(&str) -> bool,
    ) -> Result<Completion>;

    /// Requires the model to be loaded with `embeddings` enabled
    fn get_embeddings(&mut self, text: &str) -> Result<Vec<f32>>;

    fn context_size(&self) -> Result<usize>;

    fn vocab_size(&self) -> Result<usize>;

    fn model_info(&self) -> Result<String>;

    /// Parameters of the loaded model
    fn loaded_params(&self) -> Option<&TextModelParams>;
}

struct LoadedTextModel {
    model: Box<dyn TextModel>,
    params: TextModelParams,
    _runtime: RuntimeHandle,
}

/// [`TextInference`] over a pluggable [`TextBackend`]
pub struct TextInferenceInterface {
    backend: Arc<dyn TextBackend>,
    loaded: Option<LoadedTextModel>,
}

impl TextInferenceInterface {
    /// Interface backed by the candle GGUF backend
    pub fn new() -> Self {
        Self::with_backend(Arc::new(CandleTextBackend))
    }

    pub fn with_backend(backend: Arc<dyn TextBackend>) -> Self {
        Self {
            backend,
            loaded: None,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn loaded(&self) -> Result<&LoadedTextModel> {
        self.loaded.as_ref().ok_or(InferenceError::ModelNotLoaded)
    }

    fn run_generation(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        sink: &mut dyn FnMut(&str) -> bool,
    ) -> Result<Completion> {
        params.validate()?;
        let loaded = self.loaded.as_mut().ok_or(InferenceError::ModelNotLoaded)?;
        if prompt.is_empty() {
            return Err(InferenceError::EmptyPrompt);
        }

        let model = loaded.model.as_mut();
        let start = Instant::now();

        let prompt_tokens = model
            .tokenize(prompt, params.add_bos, params.parse_special)
            .map_err(|e| InferenceError::Tokenization(format!("{:#}", e)))?;
        if prompt_tokens.is_empty() {
            return Err(InferenceError::EmptyPrompt);
        }

        let context_size = model.context_size();
        if prompt_tokens.len() >= context_size {
            return Err(InferenceError::ContextExceeded {
                prompt_tokens: prompt_tokens.len(),
                context_size,
            });
        }

        if params.n_threads > 0 {
            debug!(
                n_threads = params.n_threads,
                "Thread count is managed by the backend"
            );
        }

        let budget = usize::try_from(params.n_predict).unwrap_or(usize::MAX);
        debug!(
            prompt_tokens = prompt_tokens.len(),
            budget = params.n_predict,
            context_size,
            "Starting generation"
        );

        let mut sampler = SamplerChain::new(params);
        let mut stream = TokenStream::new();
        let mut matcher = StopSequenceMatcher::new(&params.stop_sequences);
        // Byte offset of each generated token's text within the full output
        let mut token_offsets: Vec<usize> = Vec::new();
        let mut text = String::new();
        let mut first_token_at: Option<Instant> = None;
        let mut finish_reason;

        let mut pos = prompt_tokens.len();
        let mut logits = if budget == 0 {
            Vec::new()
        } else {
            model
                .forward(&prompt_tokens, 0)
                .map_err(InferenceError::backend)?
        };

        let cancelled = |tokens: usize| InferenceError::Cancelled {
            tokens_generated: tokens,
        };

        loop {
            if token_offsets.len() >= budget {
                finish_reason = FinishReason::Length;
                break;
            }
            if pos >= context_size {
                finish_reason = FinishReason::ContextFull;
                break;
            }

            let token = sampler.sample(&logits);
            if first_token_at.is_none() {
                first_token_at = Some(Instant::now());
            }
            if model.is_end_of_generation(token) {
                finish_reason = FinishReason::EndOfGeneration;
                break;
            }

            sampler.accept(token);
            token_offsets.push(matcher.total_len());

            if let Some(piece) = stream.push(model, token).map_err(InferenceError::backend)? {
                match matcher.push(&piece) {
                    StopOutcome::Continue { ready } => {
                        if !ready.is_empty() {
                            text.push_str(&ready);
                            if !sink(&ready) {
                                return Err(cancelled(token_offsets.len()));
                            }
                        }
                    }
                    StopOutcome::Stopped { ready } => {
                        if !ready.is_empty() {
                            text.push_str(&ready);
                            if !sink(&ready) {
                                return Err(cancelled(token_offsets.len()));
                            }
                        }
                        finish_reason = FinishReason::StopSequence;
                        break;
                    }
                }
            }

            if token_offsets.len() >= budget {
                finish_reason = FinishReason::Length;
                break;
            }

            logits = model
                .forward(&[token], pos)
                .map_err(InferenceError::backend)?;
            pos += 1;
        }

        if finish_reason != FinishReason::StopSequence {
            let mut rest = String::new();
            if let Some(piece) = stream.flush(model).map_err(InferenceError::backend)? {
                match matcher.push(&piece) {
                    StopOutcome::Continue { ready } => rest.push_str(&ready),
                    StopOutcome::Stopped { ready } => {
                        rest.push_str(&ready);
                        finish_reason = FinishReason::StopSequence;
                    }
                }
            }
            rest.push_str(&matcher.finish());
            if !rest.is_empty() {
                text.push_str(&rest);
                if !sink(&rest) {
                    return Err(cancelled(token_offsets.len()));
                }
            }
        }

        let tokens_generated = match matcher.cut() {
            Some(cut) => token_offsets.iter().filter(|&&offset| offset < cut).count(),
            None => token_offsets.len(),
        };

        let end = Instant::now();
        let first = first_token_at.unwrap_or(end);
        let completion = Completion {
            text,
            time_to_first_token_ms: first.duration_since(start).as_secs_f64() * 1000.0,
            decode_duration_ms: end.duration_since(first).as_secs_f64() * 1000.0,
            tokens_generated,
            finish_reason,
        };

        debug!(
            tokens = completion.tokens_generated,
            ttft_ms = completion.time_to_first_token_ms,
            decode_ms = completion.decode_duration_ms,
            finish = ?completion.finish_reason,
            "Generation finished"
        );

        Ok(completion)
    }
}

impl Default for TextInferenceInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl TextInference for TextInferenceInterface {
    fn load_model(&mut self, mut params: TextModelParams) -> Result<()> {
        self.unload_model();

        params.validate()?;
        if params.n_gpu_layers < 0 {
            warn!(
                "Negative n_gpu_layers ({}) clamped to 0",
                params.n_gpu_layers
            );
            params.n_gpu_layers = 0;
        }

        let runtime = RuntimeHandle::acquire();
        info!(
            "Loading text model {} with {} backend",
            params.model_path.display(),
            self.backend.name()
        );

        let model = self
            .backend
            .load(&params)
            .map_err(|e| InferenceError::load_failed(&params.model_path, e))?;

        info!("Text model loaded: {}", model.describe());

        self.loaded = Some(LoadedTextModel {
            model,
            params,
            _runtime: runtime,
        });
        Ok(())
    }

    fn unload_model(&mut self) {
        if let Some(loaded) = self.loaded.take() {
            info!("Unloading text model {}", loaded.params.model_path.display());
        }
    }

    fn is_model_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
        self.loaded()?
            .model
            .tokenize(text, false, false)
            .map_err(|e| InferenceError::Tokenization(format!("{:#}", e)))
    }

    fn detokenize(&self, tokens: &[Token]) -> Result<String> {
        self.loaded()?
            .model
            .detokenize(tokens)
            .map_err(|e| InferenceError::Tokenization(format!("{:#}", e)))
    }

    fn generate_completion(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Completion> {
        self.run_generation(prompt, params, &mut |_| true)
    }

    fn generate_completion_streaming(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        on_token: &mut dyn FnMut(&str) -> bool,
    ) -> Result<Completion> {
        self.run_generation(prompt, params, on_token)
    }

    fn get_embeddings(&mut self, text: &str) -> Result<Vec<f32>> {
        let loaded = self.loaded.as_mut().ok_or(InferenceError::ModelNotLoaded)?;
        if !loaded.params.embeddings {
            return Err(InferenceError::EmbeddingsDisabled);
        }
        if text.is_empty() {
            return Err(InferenceError::EmptyPrompt);
        }

        let tokens = loaded
            .model
            .tokenize(text, true, false)
            .map_err(|e| InferenceError::Tokenization(format!("{:#}", e)))?;
        let context_size = loaded.model.context_size();
        if tokens.len() > context_size {
            return Err(InferenceError::ContextExceeded {
                prompt_tokens: tokens.len(),
                context_size,
            });
        }

        loaded
            .model
            .embeddings(&tokens)
            .map_err(InferenceError::backend)
    }

    fn context_size(&self) -> Result<usize> {
        Ok(self.loaded()?.model.context_size())
    }

    fn vocab_size(&self) -> Result<usize> {
        Ok(self.loaded()?.model.vocab_size())
    }

    fn model_info(&self) -> Result<String> {
        let loaded = self.loaded()?;
        Ok(format!("{} [{}]", loaded.model.describe(), loaded.params))
    }

    fn loaded_params(&self) -> Option<&TextModelParams> {
        self.loaded.as_ref().map(|loaded| &loaded.params)
    }
}

impl std::fmt::Debug for TextInferenceInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextInferenceInterface")
            .field("backend", &self.backend.name())
            .field(
                "model",
                &self.loaded.as_ref().map(|l| l.params.model_path.display().to_string()),
            )
            .finish()
    }
}
