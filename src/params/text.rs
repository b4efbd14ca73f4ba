use super::ParamError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Largest context window a text model may be loaded with
pub const MAX_CONTEXT_SIZE: u32 = 32768;

/// How a text model is loaded.
///
/// Retained by the interface after loading for introspection and reloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TextModelParams {
    /// Path to the GGUF weights
    pub model_path: PathBuf,
    /// Tokenizer file; defaults to `tokenizer.json` next to the weights
    pub tokenizer_path: Option<PathBuf>,
    /// Context window in tokens
    pub n_ctx: u32,
    /// Layers to offload to the accelerator; any positive value selects it
    pub n_gpu_layers: i32,
    /// Accelerator device index
    pub main_gpu: u32,
    /// Maximum tokens per forward pass
    pub n_batch: u32,
    /// Split tensors across accelerators
    pub tensor_split: bool,
    /// Load the vocabulary only, no weights
    pub vocab_only: bool,
    /// Memory-map the weights file
    pub use_mmap: bool,
    /// Lock weights into RAM
    pub use_mlock: bool,
    /// Enable embeddings extraction
    pub embeddings: bool,
}

impl Default for TextModelParams {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            tokenizer_path: None,
            n_ctx: 2048,
            n_gpu_layers: 0,
            main_gpu: 0,
            n_batch: 512,
            tensor_split: false,
            vocab_only: false,
            use_mmap: true,
            use_mlock: false,
            embeddings: false,
        }
    }
}

impl TextModelParams {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            ..Default::default()
        }
    }

    pub fn with_tokenizer(mut self, path: impl Into<PathBuf>) -> Self {
        self.tokenizer_path = Some(path.into());
        self
    }

    pub fn with_context_size(mut self, n_ctx: u32) -> Self {
        self.n_ctx = n_ctx;
        self
    }

    pub fn with_gpu_layers(mut self, n_gpu_layers: i32) -> Self {
        self.n_gpu_layers = n_gpu_layers;
        self
    }

    pub fn with_main_gpu(mut self, main_gpu: u32) -> Self {
        self.main_gpu = main_gpu;
        self
    }

    pub fn with_batch_size(mut self, n_batch: u32) -> Self {
        self.n_batch = n_batch;
        self
    }

    pub fn with_tensor_split(mut self, tensor_split: bool) -> Self {
        self.tensor_split = tensor_split;
        self
    }

    pub fn with_vocab_only(mut self, vocab_only: bool) -> Self {
        self.vocab_only = vocab_only;
        self
    }

    pub fn with_mmap(mut self, use_mmap: bool) -> Self {
        self.use_mmap = use_mmap;
        self
    }

    pub fn with_mlock(mut self, use_mlock: bool) -> Self {
        self.use_mlock = use_mlock;
        self
    }

    pub fn with_embeddings(mut self, embeddings: bool) -> Self {
        self.embeddings = embeddings;
        self
    }

    /// Tokenizer location, falling back to `tokenizer.json` beside the weights
    pub fn resolved_tokenizer_path(&self) -> PathBuf {
        match &self.tokenizer_path {
            Some(path) => path.clone(),
            None => self
                .model_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("tokenizer.json"),
        }
    }

    /// Checks the fields a load cannot proceed without
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.model_path.as_os_str().is_empty() {
            return Err(ParamError::new("model_path", "must not be empty"));
        }
        if self.n_ctx == 0 || self.n_ctx > MAX_CONTEXT_SIZE {
            return Err(ParamError::new(
                "n_ctx",
                format!("{} is outside 1..={}", self.n_ctx, MAX_CONTEXT_SIZE),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for TextModelParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TextModelParams{{model_path={}, n_ctx={}, n_gpu_layers={}, main_gpu={}, n_batch={}, \
             tensor_split={}, vocab_only={}, use_mmap={}, use_mlock={}, embeddings={}}}",
            self.model_path.display(),
            self.n_ctx,
            self.n_gpu_layers,
            self.main_gpu,
            self.n_batch,
            self.tensor_split,
            self.vocab_only,
            self.use_mmap,
            self.use_mlock,
            self.embeddings
        )
    }
}

/// Sampling and stopping configuration for one generation call.
///
/// Samplers are applied in a fixed order: repeat penalty, top-k, top-p,
/// temperature, then the categorical draw.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    /// Token budget; negative means "until the context is full"
    pub n_predict: i32,
    /// Softmax temperature; 0 selects the arg-max token
    pub temperature: f32,
    /// Keep the `top_k` most likely tokens; 0 disables
    pub top_k: i32,
    /// Nucleus threshold; 1.0 disables
    pub top_p: f32,
    /// Repetition penalty; 1.0 disables
    pub repeat_penalty: f32,
    /// Window of recent tokens the penalties look at; 0 disables, -1 means whole history
    pub penalty_last_n: i32,
    pub penalty_freq: f32,
    pub penalty_present: f32,
    /// Case-sensitive substrings that end generation
    pub stop_sequences: Vec<String>,
    pub n_batch: u32,
    /// Compute threads; 0 leaves the backend default
    pub n_threads: u32,
    /// Prepend the beginning-of-sequence token to the prompt
    pub add_bos: bool,
    /// Interpret special-token text in the prompt
    pub parse_special: bool,
    /// RNG seed; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            n_predict: 128,
            temperature: 0.8,
            top_k: 40,
            top_p: 0.95,
            repeat_penalty: 1.1,
            penalty_last_n: 64,
            penalty_freq: 0.0,
            penalty_present: 0.0,
            stop_sequences: Vec::new(),
            n_batch: 1024,
            n_threads: 0,
            add_bos: true,
            parse_special: false,
            seed: None,
        }
    }
}

impl GenerationParams {
    /// Deterministic arg-max decoding with penalties disabled
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            top_k: 0,
            top_p: 1.0,
            repeat_penalty: 1.0,
            ..Default::default()
        }
    }

    pub fn with_max_tokens(mut self, n_predict: i32) -> Self {
        self.n_predict = n_predict;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_k(mut self, top_k: i32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_repeat_penalty(mut self, penalty: f32, last_n: i32) -> Self {
        self.repeat_penalty = penalty;
        self.penalty_last_n = last_n;
        self
    }

    pub fn with_frequency_penalty(mut self, penalty: f32) -> Self {
        self.penalty_freq = penalty;
        self
    }

    pub fn with_presence_penalty(mut self, penalty: f32) -> Self {
        self.penalty_present = penalty;
        self
    }

    pub fn with_stop_sequence(mut self, stop: impl Into<String>) -> Self {
        self.stop_sequences.push(stop.into());
        self
    }

    pub fn with_threads(mut self, n_threads: u32) -> Self {
        self.n_threads = n_threads;
        self
    }

    pub fn with_bos(mut self, add_bos: bool) -> Self {
        self.add_bos = add_bos;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ParamError::new(
                "temperature",
                format!("{} must be a finite value >= 0", self.temperature),
            ));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ParamError::new(
                "top_p",
                format!("{} is outside 0..=1", self.top_p),
            ));
        }
        if self.top_k < 0 {
            return Err(ParamError::new(
                "top_k",
                format!("{} must be >= 0", self.top_k),
            ));
        }
        if !self.repeat_penalty.is_finite() || self.repeat_penalty <= 0.0 {
            return Err(ParamError::new(
                "repeat_penalty",
                format!("{} must be > 0", self.repeat_penalty),
            ));
        }
        Ok(())
    }
}

impl PartialEq for GenerationParams {
    fn eq(&self, other: &Self) -> bool {
        self.n_predict == other.n_predict
            && self.temperature.to_bits() == other.temperature.to_bits()
            && self.top_k == other.top_k
            && self.top_p.to_bits() == other.top_p.to_bits()
            && self.repeat_penalty.to_bits() == other.repeat_penalty.to_bits()
            && self.penalty_last_n == other.penalty_last_n
            && self.penalty_freq.to_bits() == other.penalty_freq.to_bits()
            && self.penalty_present.to_bits() == other.penalty_present.to_bits()
            && self.stop_sequences == other.stop_sequences
            && self.n_batch == other.n_batch
            && self.n_threads == other.n_threads
            && self.add_bos == other.add_bos
            && self.parse_special == other.parse_special
            && self.seed == other.seed
    }
}

impl Eq for GenerationParams {}

impl Hash for GenerationParams {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.n_predict.hash(state);
        self.temperature.to_bits().hash(state);
        self.top_k.hash(state);
        self.top_p.to_bits().hash(state);
        self.repeat_penalty.to_bits().hash(state);
        self.penalty_last_n.hash(state);
        self.penalty_freq.to_bits().hash(state);
        self.penalty_present.to_bits().hash(state);
        self.stop_sequences.hash(state);
        self.n_batch.hash(state);
        self.n_threads.hash(state);
        self.add_bos.hash(state);
        self.parse_special.hash(state);
        self.seed.hash(state);
    }
}

impl fmt::Display for GenerationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GenerationParams{{n_predict={}, temperature={}, top_k={}, top_p={}, \
             repeat_penalty={}, penalty_last_n={}, penalty_freq={}, penalty_present={}, \
             stop_sequences={:?}, n_batch={}, n_threads={}, add_bos={}, parse_special={}",
            self.n_predict,
            self.temperature,
            self.top_k,
            self.top_p,
            self.repeat_penalty,
            self.penalty_last_n,
            self.penalty_freq,
            self.penalty_present,
            self.stop_sequences,
            self.n_batch,
            self.n_threads,
            self.add_bos,
            self.parse_special
        )?;
        match self.seed {
            Some(seed) => write!(f, ", seed={}}}", seed),
            None => write!(f, "}}"),
        }
    }
}
