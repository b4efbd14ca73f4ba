use super::ParamError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// How a speech model is loaded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechModelParams {
    /// Compute threads, defaults to `min(4, available cores)`
    pub n_threads: u32,
    pub use_gpu: bool,
    pub flash_attn: bool,
    /// Encoder context override; 0 keeps the model default
    pub audio_ctx: u32,
    /// Weights file (`.safetensors` or `.gguf`); `config.json` and
    /// `tokenizer.json` are expected beside it
    pub model_path: PathBuf,
    /// Spoken language code, used by multilingual models
    pub language: String,
}

fn default_speech_threads() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4) as u32)
        .unwrap_or(4)
}

impl Default for SpeechModelParams {
    fn default() -> Self {
        Self {
            n_threads: default_speech_threads(),
            use_gpu: true,
            flash_attn: false,
            audio_ctx: 0,
            model_path: PathBuf::from("models/whisper-base.en/model.safetensors"),
            language: "en".to_string(),
        }
    }
}

impl SpeechModelParams {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            ..Default::default()
        }
    }

    pub fn with_threads(mut self, n_threads: u32) -> Self {
        self.n_threads = n_threads;
        self
    }

    pub fn with_gpu(mut self, use_gpu: bool) -> Self {
        self.use_gpu = use_gpu;
        self
    }

    pub fn with_flash_attn(mut self, flash_attn: bool) -> Self {
        self.flash_attn = flash_attn;
        self
    }

    pub fn with_audio_ctx(mut self, audio_ctx: u32) -> Self {
        self.audio_ctx = audio_ctx;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Directory holding the weights and their companion files
    pub fn model_dir(&self) -> &Path {
        self.model_path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        if self.model_path.as_os_str().is_empty() {
            return Err(ParamError::new("model_path", "must not be empty"));
        }
        if self.language.is_empty() {
            return Err(ParamError::new("language", "must not be empty"));
        }
        Ok(())
    }
}

impl fmt::Display for SpeechModelParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SpeechModelParams{{n_threads={}, use_gpu={}, flash_attn={}, audio_ctx={}, model_path={}, language={}}}",
            self.n_threads,
            self.use_gpu,
            self.flash_attn,
            self.audio_ctx,
            self.model_path.display(),
            self.language
        )
    }
}

/// Decoding, streaming and output options for transcription
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechGenerationParams {
    /// Streaming step; `<= 0` switches streaming to voice-activity mode
    pub step_ms: i32,
    /// Audio window transcribed per streaming step
    pub length_ms: i32,
    /// Audio carried over from the previous window
    pub keep_ms: i32,
    /// Capture device for the host's audio layer; -1 is the default device
    pub capture_id: i32,
    /// Voice-activity energy ratio threshold
    pub vad_thold: f32,
    /// High-pass cutoff (Hz) applied before voice-activity detection
    pub freq_thold: f32,
    /// Translate to English instead of transcribing
    pub translate: bool,
    /// Mark speaker turns
    pub tinydiarize: bool,
    /// Disable temperature fallback
    pub no_fallback: bool,
    /// Do not condition a window on the previous window's text
    pub no_context: bool,
    /// Tokens per segment; 0 lets the model decide
    pub max_tokens: u32,
    /// Beam width; values <= 1 decode greedily
    pub beam_size: i32,
    /// Candidates sampled per temperature step when temperature > 0
    pub best_of: u32,
    pub temperature: f32,
    /// Temperature increase for each fallback attempt
    pub temperature_inc: f32,
    /// Token-entropy threshold below which a decode is treated as repetitive
    pub entropy_thold: f32,
    /// Average log-probability threshold below which a decode falls back
    pub logprob_thold: f32,
    /// No-speech probability above which a segment is dropped
    pub no_speech_thold: f32,
    /// Keep special tokens in the output text
    pub print_special: bool,
    /// Plain text output without `[start --> end]` prefixes
    pub no_timestamps: bool,
    /// Write the input audio as a 16 kHz mono WAV here
    pub save_audio_path: Option<PathBuf>,
    /// Also write the transcript to this file
    pub transcript_path: Option<PathBuf>,
}

impl Default for SpeechGenerationParams {
    fn default() -> Self {
        Self {
            step_ms: 3000,
            length_ms: 10000,
            keep_ms: 200,
            capture_id: -1,
            vad_thold: 0.6,
            freq_thold: 100.0,
            translate: false,
            tinydiarize: false,
            no_fallback: false,
            no_context: true,
            max_tokens: 32,
            beam_size: -1,
            best_of: 2,
            temperature: 0.0,
            temperature_inc: 0.2,
            entropy_thold: 2.4,
            logprob_thold: -1.0,
            no_speech_thold: 0.6,
            print_special: false,
            no_timestamps: false,
            save_audio_path: None,
            transcript_path: None,
        }
    }
}

impl SpeechGenerationParams {
    pub fn with_window(mut self, step_ms: i32, length_ms: i32, keep_ms: i32) -> Self {
        self.step_ms = step_ms;
        self.length_ms = length_ms;
        self.keep_ms = keep_ms;
        self
    }

    pub fn with_translate(mut self, translate: bool) -> Self {
        self.translate = translate;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.no_timestamps = !enabled;
        self
    }

    pub fn with_vad(mut self, vad_thold: f32, freq_thold: f32) -> Self {
        self.vad_thold = vad_thold;
        self.freq_thold = freq_thold;
        self
    }

    pub fn with_temperature(mut self, temperature: f32, increment: f32) -> Self {
        self.temperature = temperature;
        self.temperature_inc = increment;
        self
    }

    pub fn with_transcript_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.transcript_path = Some(path.into());
        self
    }

    pub fn with_save_audio(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_audio_path = Some(path.into());
        self
    }

    /// Streaming runs in voice-activity mode when the step is not positive
    pub fn uses_vad(&self) -> bool {
        self.step_ms <= 0
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ParamError::new(
                "temperature",
                format!("{} must be a finite value >= 0", self.temperature),
            ));
        }
        if !self.uses_vad() && self.length_ms < self.step_ms {
            return Err(ParamError::new(
                "length_ms",
                format!(
                    "{} must be at least step_ms ({})",
                    self.length_ms, self.step_ms
                ),
            ));
        }
        if self.keep_ms < 0 {
            return Err(ParamError::new("keep_ms", "must be >= 0"));
        }
        Ok(())
    }
}

impl PartialEq for SpeechGenerationParams {
    fn eq(&self, other: &Self) -> bool {
        self.step_ms == other.step_ms
            && self.length_ms == other.length_ms
            && self.keep_ms == other.keep_ms
            && self.capture_id == other.capture_id
            && self.vad_thold.to_bits() == other.vad_thold.to_bits()
            && self.freq_thold.to_bits() == other.freq_thold.to_bits()
            && self.translate == other.translate
            && self.tinydiarize == other.tinydiarize
            && self.no_fallback == other.no_fallback
            && self.no_context == other.no_context
            && self.max_tokens == other.max_tokens
            && self.beam_size == other.beam_size
            && self.best_of == other.best_of
            && self.temperature.to_bits() == other.temperature.to_bits()
            && self.temperature_inc.to_bits() == other.temperature_inc.to_bits()
            && self.entropy_thold.to_bits() == other.entropy_thold.to_bits()
            && self.logprob_thold.to_bits() == other.logprob_thold.to_bits()
            && self.no_speech_thold.to_bits() == other.no_speech_thold.to_bits()
            && self.print_special == other.print_special
            && self.no_timestamps == other.no_timestamps
            && self.save_audio_path == other.save_audio_path
            && self.transcript_path == other.transcript_path
    }
}

impl Eq for SpeechGenerationParams {}

impl Hash for SpeechGenerationParams {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.step_ms.hash(state);
        self.length_ms.hash(state);
        self.keep_ms.hash(state);
        self.capture_id.hash(state);
        self.vad_thold.to_bits().hash(state);
        self.freq_thold.to_bits().hash(state);
        self.translate.hash(state);
        self.tinydiarize.hash(state);
        self.no_fallback.hash(state);
        self.no_context.hash(state);
        self.max_tokens.hash(state);
        self.beam_size.hash(state);
        self.best_of.hash(state);
        self.temperature.to_bits().hash(state);
        self.temperature_inc.to_bits().hash(state);
        self.entropy_thold.to_bits().hash(state);
        self.logprob_thold.to_bits().hash(state);
        self.no_speech_thold.to_bits().hash(state);
        self.print_special.hash(state);
        self.no_timestamps.hash(state);
        self.save_audio_path.hash(state);
        self.transcript_path.hash(state);
    }
}

impl fmt::Display for SpeechGenerationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SpeechGenerationParams{{step_ms={}, length_ms={}, keep_ms={}, capture_id={}, \
             vad_thold={}, freq_thold={}, translate={}, tinydiarize={}, no_fallback={}, \
             no_context={}, max_tokens={}, beam_size={}, best_of={}, temperature={}, \
             temperature_inc={}, entropy_thold={}, logprob_thold={}, no_speech_thold={}, \
             print_special={}, no_timestamps={}",
            self.step_ms,
            self.length_ms,
            self.keep_ms,
            self.capture_id,
            self.vad_thold,
            self.freq_thold,
            self.translate,
            self.tinydiarize,
            self.no_fallback,
            self.no_context,
            self.max_tokens,
            self.beam_size,
            self.best_of,
            self.temperature,
            self.temperature_inc,
            self.entropy_thold,
            self.logprob_thold,
            self.no_speech_thold,
            self.print_special,
            self.no_timestamps
        )?;
        if let Some(path) = &self.save_audio_path {
            write!(f, ", save_audio_path={}", path.display())?;
        }
        if let Some(path) = &self.transcript_path {
            write!(f, ", transcript_path={}", path.display())?;
        }
        write!(f, "}}")
    }
}
