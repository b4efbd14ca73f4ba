//! Scripted backends for tests and benchmarks without model files.
//!
//! The text double uses a byte-level vocabulary (tokens `0..=255` are raw
//! bytes) plus BOS/EOS, and replays a fixed response greedily. The speech
//! double returns canned segments.

use super::backend::{
    Segment, SpeechBackend, SpeechModel, TextBackend, TextModel, Token,
};
use crate::params::{SpeechGenerationParams, SpeechModelParams, TextModelParams};
use anyhow::{anyhow, bail, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BOS_TOKEN: Token = 256;
pub const EOS_TOKEN: Token = 257;
const VOCAB_SIZE: usize = 258;
const EMBEDDING_DIM: usize = 8;

/// Load/unload counters shared between a backend and the models it made
#[derive(Debug, Default)]
pub struct BackendStats {
    loads: AtomicUsize,
    unloads: AtomicUsize,
}

impl BackendStats {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }

    /// Models currently alive
    pub fn live(&self) -> usize {
        self.loads().saturating_sub(self.unloads())
    }
}

/// Byte-level model replaying a scripted response
pub struct ScriptedTextModel {
    response: Vec<Token>,
    repeat: bool,
    context_size: usize,
    cursor: usize,
    token_delay: Duration,
    panic_on_forward: bool,
    stats: Option<Arc<BackendStats>>,
}

impl ScriptedTextModel {
    pub fn new() -> Self {
        Self {
            response: b"ok".iter().map(|&b| b as Token).collect(),
            repeat: false,
            context_size: 2048,
            cursor: 0,
            token_delay: Duration::ZERO,
            panic_on_forward: false,
            stats: None,
        }
    }

    fn target(&self) -> Token {
        if self.repeat && !self.response.is_empty() {
            return self.response[self.cursor % self.response.len()];
        }
        self.response.get(self.cursor).copied().unwrap_or(EOS_TOKEN)
    }
}

impl Default for ScriptedTextModel {
    fn default() -> Self {
        Self::new()
    }
}

impl TextModel for ScriptedTextModel {
    fn describe(&self) -> String {
        format!("scripted byte model (ctx {})", self.context_size)
    }

    fn vocab_size(&self) -> usize {
        VOCAB_SIZE
    }

    fn context_size(&self) -> usize {
        self.context_size
    }

    fn tokenize(&self, text: &str, add_bos: bool, _parse_special: bool) -> Result<Vec<Token>> {
        let mut tokens = Vec::with_capacity(text.len() + 1);
        if add_bos {
            tokens.push(BOS_TOKEN);
        }
        tokens.extend(text.bytes().map(|b| b as Token));
        Ok(tokens)
    }

    fn detokenize(&self, tokens: &[Token]) -> Result<String> {
        let bytes: Vec<u8> = tokens
            .iter()
            .filter(|&&t| t < 256)
            .map(|&t| t as u8)
            .collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn is_end_of_generation(&self, token: Token) -> bool {
        token == EOS_TOKEN
    }

    fn forward(&mut self, tokens: &[Token], pos: usize) -> Result<Vec<f32>> {
        if self.panic_on_forward {
            panic!("scripted backend panic");
        }
        if tokens.is_empty() {
            bail!("empty batch");
        }
        if pos + tokens.len() > self.context_size {
            bail!(
                "position {} exceeds context of {}",
                pos + tokens.len(),
                self.context_size
            );
        }
        if pos == 0 {
            self.cursor = 0;
        } else {
            self.cursor += 1;
        }
        if !self.token_delay.is_zero() {
            std::thread::sleep(self.token_delay);
        }
        let mut logits = vec![0.0f32; VOCAB_SIZE];
        logits[self.target() as usize] = 10.0;
        Ok(logits)
    }

    fn embeddings(&mut self, tokens: &[Token]) -> Result<Vec<f32>> {
        let mut pooled = vec![0.0f32; EMBEDDING_DIM];
        for &token in tokens {
            pooled[token as usize % EMBEDDING_DIM] += 1.0;
        }
        let norm = pooled.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            pooled.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(pooled)
    }
}

impl Drop for ScriptedTextModel {
    fn drop(&mut self) {
        if let Some(stats) = &self.stats {
            stats.unloads.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// [`TextBackend`] producing [`ScriptedTextModel`]s
pub struct ScriptedTextBackend {
    response: String,
    repeat: bool,
    token_delay: Duration,
    failing: HashSet<PathBuf>,
    panicking: HashSet<PathBuf>,
    stats: Arc<BackendStats>,
}

impl ScriptedTextBackend {
    pub fn new() -> Self {
        Self {
            response: "ok".to_string(),
            repeat: false,
            token_delay: Duration::ZERO,
            failing: HashSet::new(),
            panicking: HashSet::new(),
            stats: Arc::new(BackendStats::default()),
        }
    }

    /// Text every generation replays before emitting EOS
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = response.into();
        self
    }

    /// Cycle the response forever instead of ending with EOS
    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Sleep this long in every forward pass
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Loading this path fails
    pub fn failing_for(mut self, path: impl Into<PathBuf>) -> Self {
        self.failing.insert(path.into());
        self
    }

    /// Models loaded from this path panic on their first forward pass
    pub fn panicking_for(mut self, path: impl Into<PathBuf>) -> Self {
        self.panicking.insert(path.into());
        self
    }

    pub fn stats(&self) -> Arc<BackendStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for ScriptedTextBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TextBackend for ScriptedTextBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn load(&self, params: &TextModelParams) -> Result<Box<dyn TextModel>> {
        if self.failing.contains(&params.model_path) {
            return Err(anyhow!(
                "scripted load failure for {}",
                params.model_path.display()
            ));
        }
        self.stats.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedTextModel {
            response: self.response.bytes().map(|b| b as Token).collect(),
            repeat: self.repeat,
            context_size: params.n_ctx as usize,
            cursor: 0,
            token_delay: self.token_delay,
            panic_on_forward: self.panicking.contains(&params.model_path),
            stats: Some(Arc::clone(&self.stats)),
        }))
    }
}

/// Speech model returning canned segments and recording what it was fed
pub struct ScriptedSpeechModel {
    segments: Vec<Segment>,
    received: Arc<Mutex<Vec<usize>>>,
    stats: Arc<BackendStats>,
}

impl SpeechModel for ScriptedSpeechModel {
    fn describe(&self) -> String {
        "scripted speech model".to_string()
    }

    fn transcribe(&mut self, pcm: &[f32], _params: &SpeechGenerationParams) -> Result<Vec<Segment>> {
        if let Ok(mut received) = self.received.lock() {
            received.push(pcm.len());
        }
        Ok(self.segments.clone())
    }
}

impl Drop for ScriptedSpeechModel {
    fn drop(&mut self) {
        self.stats.unloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// [`SpeechBackend`] producing [`ScriptedSpeechModel`]s
pub struct ScriptedSpeechBackend {
    segments: Vec<Segment>,
    failing: HashSet<PathBuf>,
    received: Arc<Mutex<Vec<usize>>>,
    stats: Arc<BackendStats>,
}

impl ScriptedSpeechBackend {
    pub fn new() -> Self {
        Self {
            segments: vec![Segment::new(0, 1000, " hello")],
            failing: HashSet::new(),
            received: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(BackendStats::default()),
        }
    }

    pub fn with_segments(mut self, segments: Vec<Segment>) -> Self {
        self.segments = segments;
        self
    }

    pub fn failing_for(mut self, path: impl Into<PathBuf>) -> Self {
        self.failing.insert(path.into());
        self
    }

    /// Sample counts of every transcribe call so far
    pub fn received(&self) -> Vec<usize> {
        self.received
            .lock()
            .map(|received| received.clone())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> Arc<BackendStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for ScriptedSpeechBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechBackend for ScriptedSpeechBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn load(&self, params: &SpeechModelParams) -> Result<Box<dyn SpeechModel>> {
        if self.failing.contains(&params.model_path) {
            return Err(anyhow!(
                "scripted load failure for {}",
                params.model_path.display()
            ));
        }
        self.stats.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSpeechModel {
            segments: self.segments.clone(),
            received: Arc::clone(&self.received),
            stats: Arc::clone(&self.stats),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_model_replays_response() {
        let backend = ScriptedTextBackend::new().with_response("hi");
        let mut model = backend.load(&TextModelParams::new("m.gguf")).unwrap();
        let first = model.forward(&[BOS_TOKEN], 0).unwrap();
        assert_eq!(first[b'h' as usize], 10.0);
        let second = model.forward(&[b'h' as Token], 1).unwrap();
        assert_eq!(second[b'i' as usize], 10.0);
        let third = model.forward(&[b'i' as Token], 2).unwrap();
        assert_eq!(third[EOS_TOKEN as usize], 10.0);
    }

    #[test]
    fn test_repeating_model_never_ends() {
        let backend = ScriptedTextBackend::new().with_response("ab").repeating();
        let mut model = backend.load(&TextModelParams::new("m.gguf")).unwrap();
        model.forward(&[1], 0).unwrap();
        model.forward(&[1], 1).unwrap();
        let logits = model.forward(&[1], 2).unwrap();
        assert_eq!(logits[b'a' as usize], 10.0);
    }

    #[test]
    fn test_stats_track_model_lifetime() {
        let backend = ScriptedTextBackend::new();
        let stats = backend.stats();
        let model = backend.load(&TextModelParams::new("m.gguf")).unwrap();
        assert_eq!(stats.live(), 1);
        drop(model);
        assert_eq!(stats.loads(), 1);
        assert_eq!(stats.unloads(), 1);
        assert_eq!(stats.live(), 0);
    }

    #[test]
    fn test_failing_path() {
        let backend = ScriptedTextBackend::new().failing_for("bad.gguf");
        assert!(backend.load(&TextModelParams::new("bad.gguf")).is_err());
        assert_eq!(backend.stats().loads(), 0);
    }

    #[test]
    fn test_scripted_speech_records_input() {
        let backend = ScriptedSpeechBackend::new();
        let mut model = backend.load(&SpeechModelParams::new("w.gguf")).unwrap();
        let segments = model
            .transcribe(&[0.0; 160], &SpeechGenerationParams::default())
            .unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(backend.received(), vec![160]);
    }
}
