//! Whisper speech recognition on candle.
//!
//! A model directory holds `config.json`, `tokenizer.json` and the weights;
//! `.gguf` weights load the quantized variant, anything else is read as
//! safetensors.

use super::create_device;
use super::mel::mel_filters;
use crate::inference::backend::{Segment, SpeechBackend, SpeechModel, Token};
use crate::inference::runtime;
use crate::params::{SpeechGenerationParams, SpeechModelParams};
use anyhow::{anyhow, bail, Context, Result};
use candle_core::{Device, IndexOp, Tensor, D};
use candle_nn::ops::softmax;
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, audio, Config};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

/// English-only checkpoints have 51864 tokens, multilingual ones more
const MULTILINGUAL_VOCAB: usize = 51865;
/// Milliseconds per timestamp token step
const TIMESTAMP_STEP_MS: i64 = 20;
/// Window of generated tokens checked for repetition
const ENTROPY_WINDOW: usize = 32;
const SPEAKER_TURN_TOKENS: &[&str] = &["<|speaker_turn|>", "[_SOLM_]"];
const SEED: u64 = 299_792_458;

/// Loads Whisper checkpoints with candle
#[derive(Debug, Clone, Copy, Default)]
pub struct CandleSpeechBackend;

impl SpeechBackend for CandleSpeechBackend {
    fn name(&self) -> &str {
        "candle-whisper"
    }

    fn load(&self, params: &SpeechModelParams) -> Result<Box<dyn SpeechModel>> {
        Ok(Box::new(WhisperModel::load(params)?))
    }
}

enum WhisperWeights {
    Full(m::model::Whisper),
    Quantized(m::quantized_model::Whisper),
}

impl WhisperWeights {
    fn load(path: &Path, config: &Config, device: &Device) -> Result<Self> {
        debug!("Loading Whisper weights from: {}", path.display());
        let is_gguf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gguf"));

        if is_gguf {
            let vb = candle_transformers::quantized_var_builder::VarBuilder::from_gguf(path, device)
                .context("Failed to read GGUF weights")?;
            let model = m::quantized_model::Whisper::load(&vb, config.clone())
                .context("Failed to build quantized Whisper")?;
            Ok(WhisperWeights::Quantized(model))
        } else {
            // SAFETY: the weights file is not modified while mapped
            let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], m::DTYPE, device) }
                .context("Failed to map safetensors weights")?;
            let model = m::model::Whisper::load(&vb, config.clone())
                .context("Failed to build Whisper")?;
            Ok(WhisperWeights::Full(model))
        }
    }

    fn encode(&mut self, mel: &Tensor, flush: bool) -> candle_core::Result<Tensor> {
        match self {
            WhisperWeights::Full(model) => model.encoder.forward(mel, flush),
            WhisperWeights::Quantized(model) => model.encoder.forward(mel, flush),
        }
    }

    fn decode(&mut self, tokens: &Tensor, audio: &Tensor, flush: bool) -> candle_core::Result<Tensor> {
        match self {
            WhisperWeights::Full(model) => model.decoder.forward(tokens, audio, flush),
            WhisperWeights::Quantized(model) => model.decoder.forward(tokens, audio, flush),
        }
    }

    fn final_linear(&self, hidden: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            WhisperWeights::Full(model) => model.decoder.final_linear(hidden),
            WhisperWeights::Quantized(model) => model.decoder.final_linear(hidden),
        }
    }
}

/// Special token ids resolved from the tokenizer
struct SpecialTokens {
    sot: Token,
    transcribe: Token,
    translate: Token,
    no_timestamps: Token,
    eot: Token,
    no_speech: Option<Token>,
    start_of_prev: Option<Token>,
    language: Option<Token>,
    speaker_turn: Option<Token>,
}

fn token_id(tokenizer: &Tokenizer, token: &str) -> Result<Token> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| anyhow!("Tokenizer has no {} token", token))
}

impl SpecialTokens {
    fn resolve(tokenizer: &Tokenizer, config: &Config, language: &str) -> Result<Self> {
        let language = if config.vocab_size < MULTILINGUAL_VOCAB {
            if language != "en" {
                warn!("English-only model, ignoring language '{}'", language);
            }
            None
        } else if language == "auto" {
            debug!("No language token, the model predicts the language");
            None
        } else {
            Some(token_id(tokenizer, &format!("<|{}|>", language))?)
        };

        Ok(Self {
            sot: token_id(tokenizer, m::SOT_TOKEN)?,
            transcribe: token_id(tokenizer, m::TRANSCRIBE_TOKEN)?,
            translate: token_id(tokenizer, m::TRANSLATE_TOKEN)?,
            no_timestamps: token_id(tokenizer, m::NO_TIMESTAMPS_TOKEN)?,
            eot: token_id(tokenizer, m::EOT_TOKEN)?,
            no_speech: m::NO_SPEECH_TOKENS
                .iter()
                .find_map(|token| tokenizer.token_to_id(token)),
            start_of_prev: tokenizer.token_to_id("<|startofprev|>"),
            language,
            speaker_turn: SPEAKER_TURN_TOKENS
                .iter()
                .find_map(|token| tokenizer.token_to_id(token)),
        })
    }

    fn is_timestamp(&self, token: Token) -> bool {
        token > self.no_timestamps
    }

    fn timestamp_ms(&self, token: Token) -> i64 {
        i64::from(token - self.no_timestamps - 1) * TIMESTAMP_STEP_MS
    }
}

/// Outcome of decoding one 30 s window at one temperature
struct Decoded {
    /// Generated tokens, prompt excluded
    tokens: Vec<Token>,
    avg_logprob: f64,
    no_speech_prob: f64,
    entropy: f64,
    temperature: f64,
}

/// A loaded Whisper checkpoint
pub struct WhisperModel {
    weights: WhisperWeights,
    tokenizer: Tokenizer,
    config: Config,
    device: Device,
    filters: Vec<f32>,
    special: SpecialTokens,
    audio_ctx: usize,
    rng: StdRng,
    /// Text context carried into the next call when `no_context` is off
    previous: Vec<Token>,
    description: String,
}

impl WhisperModel {
    fn load(params: &SpeechModelParams) -> Result<Self> {
        let model_path = params.model_path.as_path();
        if !model_path.exists() {
            bail!("Model file not found: {}", model_path.display());
        }
        let model_dir = params.model_dir();

        let config_path = model_dir.join("config.json");
        let config: Config = serde_json::from_str(
            &std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?,
        )
        .with_context(|| format!("Invalid Whisper config {}", config_path.display()))?;

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            anyhow!(
                "Failed to load tokenizer {}: {}",
                tokenizer_path.display(),
                e
            )
        })?;

        let special = SpecialTokens::resolve(&tokenizer, &config, &params.language)?;

        debug!(
            n_threads = params.n_threads,
            flash_attn = params.flash_attn,
            "Thread count and attention kernel are chosen by candle"
        );

        let hardware = runtime::hardware();
        let device = create_device(params.use_gpu, 0, &hardware)?;
        let (weights, device) = match WhisperWeights::load(model_path, &config, &device) {
            Ok(weights) => (weights, device),
            Err(e) if !device.is_cpu() => {
                warn!(
                    "Failed to load Whisper on {}: {}. Falling back to CPU",
                    hardware.best_device(),
                    e
                );
                let weights = WhisperWeights::load(model_path, &config, &Device::Cpu)
                    .context("Failed to load Whisper on CPU fallback")?;
                (weights, Device::Cpu)
            }
            Err(e) => return Err(e),
        };

        let filters = mel_filters(m::SAMPLE_RATE, m::N_FFT, config.num_mel_bins);
        let description = format!(
            "whisper {} mel bins, {} audio ctx, {} ({})",
            config.num_mel_bins,
            config.max_source_positions,
            if special.language.is_some() { "multilingual" } else { "english" },
            if device.is_cpu() { "cpu" } else { "gpu" }
        );
        info!("Whisper model ready: {}", description);

        Ok(Self {
            weights,
            tokenizer,
            config,
            device,
            filters,
            special,
            audio_ctx: params.audio_ctx as usize,
            rng: StdRng::seed_from_u64(SEED),
            previous: Vec::new(),
            description,
        })
    }

    fn suppress_mask(&self, timestamps: bool) -> Result<Tensor> {
        let mask: Vec<f32> = (0..self.config.vocab_size as u32)
            .map(|i| {
                if self.config.suppress_tokens.contains(&i)
                    || (timestamps && i == self.special.no_timestamps)
                {
                    f32::NEG_INFINITY
                } else {
                    0.0
                }
            })
            .collect();
        Ok(Tensor::new(mask.as_slice(), &self.device)?)
    }

    fn prompt(&self, params: &SpeechGenerationParams) -> Vec<Token> {
        let mut prompt = Vec::new();
        if !params.no_context && !self.previous.is_empty() {
            if let Some(prev) = self.special.start_of_prev {
                let keep = self.config.max_target_positions / 2 - 1;
                let start = self.previous.len().saturating_sub(keep);
                prompt.push(prev);
                prompt.extend_from_slice(&self.previous[start..]);
            }
        }
        prompt.push(self.special.sot);
        if let Some(language) = self.special.language {
            prompt.push(language);
        }
        prompt.push(if params.translate {
            self.special.translate
        } else {
            self.special.transcribe
        });
        if params.no_timestamps {
            prompt.push(self.special.no_timestamps);
        }
        prompt
    }

    fn decode(
        &mut self,
        audio_features: &Tensor,
        suppress: &Tensor,
        params: &SpeechGenerationParams,
        temperature: f64,
    ) -> Result<Decoded> {
        let mut tokens = self.prompt(params);
        let prompt_len = tokens.len();
        let sample_len = self.config.max_target_positions / 2;
        let max_tokens = params.max_tokens as usize;
        let mut sum_logprob = 0f64;
        let mut no_speech_prob = 0f64;

        for i in 0..sample_len {
            let tokens_t = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let ys = self.weights.decode(&tokens_t, audio_features, i == 0)?;

            if i == 0 {
                if let Some(no_speech) = self.special.no_speech {
                    let sot_pos = tokens
                        .iter()
                        .rposition(|&t| t == self.special.sot)
                        .unwrap_or(0);
                    let logits = self.weights.final_linear(&ys.i((..1, sot_pos..sot_pos + 1))?)?.i(0)?.i(0)?;
                    no_speech_prob = f64::from(
                        softmax(&logits, 0)?.i(no_speech as usize)?.to_scalar::<f32>()?,
                    );
                }
            }

            let (_, seq_len, _) = ys.dims3()?;
            let logits = self
                .weights
                .final_linear(&ys.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?
                .broadcast_add(suppress)?;

            let next = if temperature > 0.0 {
                let probs: Vec<f32> = softmax(&(&logits / temperature)?, 0)?.to_vec1()?;
                WeightedIndex::new(&probs)?.sample(&mut self.rng) as Token
            } else {
                logits.argmax(D::Minus1)?.to_scalar::<u32>()?
            };
            tokens.push(next);

            let prob = softmax(&logits, D::Minus1)?.i(next as usize)?.to_scalar::<f32>()?;
            if next == self.special.eot || tokens.len() > self.config.max_target_positions {
                break;
            }
            sum_logprob += f64::from(prob).ln();

            if max_tokens > 0 && tokens.len() - prompt_len >= max_tokens {
                debug!(max_tokens, "Token limit reached for this window");
                break;
            }
        }

        let generated = tokens.split_off(prompt_len);
        let avg_logprob = sum_logprob / generated.len().max(1) as f64;
        Ok(Decoded {
            entropy: token_entropy(&generated),
            tokens: generated,
            avg_logprob,
            no_speech_prob,
            temperature,
        })
    }

    fn decode_with_fallback(
        &mut self,
        mel: &Tensor,
        suppress: &Tensor,
        params: &SpeechGenerationParams,
    ) -> Result<Decoded> {
        let audio_features = self.weights.encode(mel, true)?;
        let temperatures = fallback_temperatures(params);
        let last = temperatures.len() - 1;

        let mut best: Option<Decoded> = None;
        for (i, &temperature) in temperatures.iter().enumerate() {
            let candidates = if temperature > 0.0 {
                params.best_of.max(1)
            } else {
                1
            };
            let mut attempt: Option<Decoded> = None;
            for _ in 0..candidates {
                match self.decode(&audio_features, suppress, params, temperature) {
                    Ok(decoded) => {
                        if attempt
                            .as_ref()
                            .map_or(true, |current| decoded.avg_logprob > current.avg_logprob)
                        {
                            attempt = Some(decoded);
                        }
                    }
                    Err(e) if i < last => warn!("Error decoding at temperature {}: {:#}", temperature, e),
                    Err(e) => return Err(e),
                }
            }

            let Some(decoded) = attempt else { continue };
            let repetitive = decoded.tokens.len() > ENTROPY_WINDOW
                && decoded.entropy < f64::from(params.entropy_thold);
            let unlikely = decoded.avg_logprob < f64::from(params.logprob_thold);
            let silent = decoded.no_speech_prob > f64::from(params.no_speech_thold);

            if !(repetitive || unlikely) || silent || i == last {
                return Ok(decoded);
            }
            debug!(
                temperature,
                avg_logprob = decoded.avg_logprob,
                entropy = decoded.entropy,
                "Decode rejected, falling back to a higher temperature"
            );
            best = Some(decoded);
        }

        best.ok_or_else(|| anyhow!("Every decoding attempt failed"))
    }

    fn text_of(&self, tokens: &[Token], print_special: bool) -> Result<String> {
        self.tokenizer
            .decode(tokens, !print_special)
            .map_err(|e| anyhow!("Decoding failed: {}", e))
    }

    /// Splits a window's tokens at timestamp tokens
    fn segments(
        &self,
        decoded: &Decoded,
        offset_ms: i64,
        window_ms: i64,
        params: &SpeechGenerationParams,
    ) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();
        let mut pending: Vec<Token> = Vec::new();
        let mut start_ms = 0i64;
        let mut turn = false;

        let mut emit = |pending: &mut Vec<Token>, start: i64, end: i64, turn: bool| -> Result<()> {
            if pending.is_empty() {
                return Ok(());
            }
            let text = self.text_of(pending, params.print_special)?;
            pending.clear();
            if text.trim().is_empty() {
                return Ok(());
            }
            let mut segment = Segment::new(offset_ms + start, offset_ms + end, text);
            segment.speaker_turn = turn;
            segments.push(segment);
            Ok(())
        };

        for &token in &decoded.tokens {
            if token == self.special.eot || token == self.special.sot {
                continue;
            }
            if params.tinydiarize && Some(token) == self.special.speaker_turn {
                turn = true;
                continue;
            }
            if self.special.is_timestamp(token) {
                let ts = self.special.timestamp_ms(token);
                if !pending.is_empty() {
                    emit(&mut pending, start_ms, ts, turn)?;
                    turn = false;
                }
                start_ms = ts;
            } else {
                pending.push(token);
            }
        }
        emit(&mut pending, start_ms, window_ms, turn)?;
        Ok(segments)
    }
}

impl SpeechModel for WhisperModel {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn transcribe(&mut self, pcm: &[f32], params: &SpeechGenerationParams) -> Result<Vec<Segment>> {
        if pcm.is_empty() {
            bail!("No audio samples");
        }
        if params.beam_size > 1 {
            debug!(beam_size = params.beam_size, "Beam search is not available, decoding greedily");
        }
        if params.tinydiarize && self.special.speaker_turn.is_none() {
            warn!("Model has no speaker-turn token, tinydiarize has no effect");
        }
        if params.no_context {
            self.previous.clear();
        }

        let mel = audio::pcm_to_mel(&self.config, pcm, &self.filters);
        let n_mels = self.config.num_mel_bins;
        let mel_frames = mel.len() / n_mels;
        let mel = Tensor::from_vec(mel, (1, n_mels, mel_frames), &self.device)?;

        let content_frames = (pcm.len() / m::HOP_LENGTH).min(mel_frames);
        let mut window_frames = m::N_FRAMES;
        if self.audio_ctx > 0 {
            window_frames = window_frames.min(self.audio_ctx * 2);
        }
        let suppress = self.suppress_mask(!params.no_timestamps)?;
        let frame_ms = |frames: usize| (frames * m::HOP_LENGTH * 1000 / m::SAMPLE_RATE) as i64;

        let mut segments = Vec::new();
        let mut seek = 0usize;
        while seek < content_frames {
            let size = window_frames.min(mel_frames - seek);
            let mel_window = mel.narrow(2, seek, size)?;
            let decoded = self.decode_with_fallback(&mel_window, &suppress, params)?;

            let offset_ms = frame_ms(seek);
            let window_ms = frame_ms(size.min(content_frames - seek));
            seek += size;

            if decoded.no_speech_prob > f64::from(params.no_speech_thold)
                && decoded.avg_logprob < f64::from(params.logprob_thold)
            {
                debug!(
                    offset_ms,
                    no_speech_prob = decoded.no_speech_prob,
                    "No speech detected, skipping window"
                );
                continue;
            }

            debug!(
                offset_ms,
                temperature = decoded.temperature,
                tokens = decoded.tokens.len(),
                "Window decoded"
            );

            let window_segments = self.segments(&decoded, offset_ms, window_ms, params)?;
            if !params.no_context {
                self.previous.extend(
                    decoded
                        .tokens
                        .iter()
                        .copied()
                        .filter(|&t| t != self.special.eot),
                );
            }
            segments.extend(window_segments);
        }

        Ok(segments)
    }

    fn reset(&mut self) {
        self.previous.clear();
    }
}

/// Temperatures tried in order: the base one, then increments up to 1.0
fn fallback_temperatures(params: &SpeechGenerationParams) -> Vec<f64> {
    let base = f64::from(params.temperature);
    let step = f64::from(params.temperature_inc);
    let mut temperatures = vec![base];
    if params.no_fallback || step <= 0.0 {
        return temperatures;
    }
    let mut t = base + step;
    while t <= 1.0 + 1e-6 {
        temperatures.push(t);
        t += step;
    }
    temperatures
}

/// Shannon entropy (nats) of the token histogram over the trailing window
fn token_entropy(tokens: &[Token]) -> f64 {
    let window = &tokens[tokens.len().saturating_sub(ENTROPY_WINDOW)..];
    if window.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<Token, usize> = HashMap::new();
    for &token in window {
        *counts.entry(token).or_default() += 1;
    }
    let n = window.len() as f64;
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / n;
            -p * p.ln()
        })
        .sum()
}
