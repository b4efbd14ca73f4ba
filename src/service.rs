//! Single entry point over the text and speech interfaces.
//!
//! [`AIService`] forwards every call to the interface it owns, so hosts need
//! one object and one error type. Dropping the service unloads both models.
//!
//! ```no_run
//! use hearth::params::{GenerationParams, TextModelParams};
//! use hearth::AIService;
//!
//! AIService::init();
//! let mut service = AIService::new();
//! if let Err(e) = service.load_text_model(TextModelParams::new("models/llama.gguf")) {
//!     eprintln!("{}", e);
//! }
//! println!("{}", service.process_prompt("Hello", &GenerationParams::default()));
//! drop(service);
//! AIService::shutdown();
//! ```

use crate::inference::runtime;
use crate::inference::{
    Completion, InferenceError, Result, SpeechInference, SpeechInferenceInterface, TextInference,
    TextInferenceInterface, Token,
};
use crate::params::{GenerationParams, SpeechGenerationParams, SpeechModelParams, TextModelParams};
use std::path::Path;
use tracing::{info, warn};

/// Orchestrator owning one text and one speech interface
pub struct AIService {
    text: Box<dyn TextInference>,
    speech: Box<dyn SpeechInference>,
}

impl AIService {
    /// Service over the candle-backed interfaces
    pub fn new() -> Self {
        Self::with_interfaces(
            Box::new(TextInferenceInterface::new()),
            Box::new(SpeechInferenceInterface::new()),
        )
    }

    pub fn with_interfaces(text: Box<dyn TextInference>, speech: Box<dyn SpeechInference>) -> Self {
        Self { text, speech }
    }

    /// Service with both models loaded up front
    pub fn with_models(text_params: TextModelParams, speech_params: SpeechModelParams) -> Result<Self> {
        let mut service = Self::new();
        service.load_text_model(text_params)?;
        service.load_speech_model(speech_params)?;
        Ok(service)
    }

    /// Process-wide backend start-up; repeated calls are no-ops
    pub fn init() {
        runtime::init();
    }

    /// Process-wide backend tear-down; repeated calls are no-ops
    pub fn shutdown() {
        runtime::shutdown();
    }

    /// Replaces the text interface, unloading the current one
    pub fn set_text_interface(&mut self, text: Box<dyn TextInference>) {
        self.text.unload_model();
        self.text = text;
    }

    /// Replaces the speech interface, unloading the current one
    pub fn set_speech_interface(&mut self, speech: Box<dyn SpeechInference>) {
        self.speech.unload_model();
        self.speech = speech;
    }

    pub fn load_text_model(&mut self, params: TextModelParams) -> Result<()> {
        let path = params.model_path.clone();
        self.text.load_model(params).inspect_err(|e| {
            warn!("Text model {} failed to load: {}", path.display(), e);
        })
    }

    pub fn unload_text_model(&mut self) {
        self.text.unload_model();
    }

    pub fn is_text_model_loaded(&self) -> bool {
        self.text.is_model_loaded()
    }

    pub fn generate_completion(&mut self, prompt: &str, params: &GenerationParams) -> Result<Completion> {
        self.require_text()?;
        self.text.generate_completion(prompt, params)
    }

    pub fn generate_completion_streaming(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        on_token: &mut dyn FnMut(&str) -> bool,
    ) -> Result<Completion> {
        self.require_text()?;
        self.text.generate_completion_streaming(prompt, params, on_token)
    }

    /// Completion text, or the error's `[Error: ...]` marker
    pub fn process_prompt(&mut self, prompt: &str, params: &GenerationParams) -> String {
        match self.generate_completion(prompt, params) {
            Ok(completion) => completion.text,
            Err(e) => e.sentinel(),
        }
    }

    pub fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
        self.require_text()?;
        self.text.tokenize(text)
    }

    pub fn detokenize(&self, tokens: &[Token]) -> Result<String> {
        self.require_text()?;
        self.text.detokenize(tokens)
    }

    pub fn embeddings(&mut self, text: &str) -> Result<Vec<f32>> {
        self.require_text()?;
        self.text.get_embeddings(text)
    }

    pub fn text_model_info(&self) -> Result<String> {
        self.require_text()?;
        self.text.model_info()
    }

    pub fn load_speech_model(&mut self, params: SpeechModelParams) -> Result<()> {
        let path = params.model_path.clone();
        self.speech.load_model(params).inspect_err(|e| {
            warn!("Speech model {} failed to load: {}", path.display(), e);
        })
    }

    pub fn unload_speech_model(&mut self) {
        self.speech.unload_model();
    }

    pub fn is_speech_model_loaded(&self) -> bool {
        self.speech.is_model_loaded()
    }

    pub fn transcribe_pcm(&mut self, pcm: &[f32], params: &SpeechGenerationParams) -> Result<String> {
        self.require_speech()?;
        self.speech.transcribe_pcm(pcm, params)
    }

    pub fn transcribe_file(&mut self, path: &Path, params: &SpeechGenerationParams) -> Result<String> {
        self.require_speech()?;
        self.speech.transcribe_file(path, params)
    }

    pub fn transcribe_stream(
        &mut self,
        chunks: &mut dyn Iterator<Item = Vec<f32>>,
        params: &SpeechGenerationParams,
        on_text: &mut dyn FnMut(&str, bool) -> bool,
    ) -> Result<String> {
        self.require_speech()?;
        self.speech.transcribe_stream(chunks, params, on_text)
    }

    /// Transcript, or the error's `[Error: ...]` marker
    pub fn process_audio_file(&mut self, path: &Path, params: &SpeechGenerationParams) -> String {
        self.transcribe_file(path, params)
            .unwrap_or_else(|e| e.sentinel())
    }

    pub fn speech_model_info(&self) -> Result<String> {
        self.require_speech()?;
        self.speech.model_info()
    }

    fn require_text(&self) -> Result<()> {
        if self.text.is_model_loaded() {
            Ok(())
        } else {
            Err(InferenceError::ModelNotLoaded)
        }
    }

    fn require_speech(&self) -> Result<()> {
        if self.speech.is_model_loaded() {
            Ok(())
        } else {
            Err(InferenceError::ModelNotLoaded)
        }
    }
}

impl Default for AIService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AIService {
    fn drop(&mut self) {
        if self.text.is_model_loaded() || self.speech.is_model_loaded() {
            info!("Shutting down AI service, unloading models");
        }
        self.text.unload_model();
        self.speech.unload_model();
    }
}

impl std::fmt::Debug for AIService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AIService")
            .field("text_loaded", &self.text.is_model_loaded())
            .field("speech_loaded", &self.speech.is_model_loaded())
            .finish()
    }
}
