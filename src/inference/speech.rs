//! Speech-to-text over a loaded speech-recognition model.
//!
//! Input is 16 kHz mono `f32` PCM. Files go through an [`AudioDecoder`]
//! first; live audio can be streamed in chunks with
//! [`SpeechInference::transcribe_stream`].

use super::backend::{Segment, SpeechBackend, SpeechModel};
use super::candle::CandleSpeechBackend;
use super::error::{InferenceError, Result};
use super::runtime::RuntimeHandle;
use crate::audio::{write_wav, AudioDecoder, SlidingWindow, VadGate, WavDecoder};
use crate::params::{SpeechGenerationParams, SpeechModelParams};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Operations a host can perform on a speech model.
///
/// Not internally synchronised: one caller at a time.
pub trait SpeechInference: Send {
    /// Loads a model, unloading any current one first. On error the
    /// interface is left unloaded.
    fn load_model(&mut self, params: SpeechModelParams) -> Result<()>;

    /// Releases the model. Idempotent.
    fn unload_model(&mut self);

    fn is_model_loaded(&self) -> bool;

    /// Transcribes 16 kHz mono PCM. Other sample rates or channel layouts
    /// produce implementation-defined text.
    fn transcribe_pcm(&mut self, pcm: &[f32], params: &SpeechGenerationParams) -> Result<String>;

    /// Decodes `path` to PCM, then transcribes it
    fn transcribe_file(&mut self, path: &Path, params: &SpeechGenerationParams) -> Result<String>;

    /// Transcribes live audio delivered as chunks of 16 kHz mono PCM.
    ///
    /// With a positive `step_ms` the stream is cut into sliding windows;
    /// otherwise an utterance is transcribed whenever a pause follows
    /// speech. `on_text` receives each window's text and whether the line
    /// is final; returning `false` ends the stream early. Returns the
    /// transcript of all final lines.
    fn transcribe_stream(
        &mut self,
        chunks: &mut dyn Iterator<Item = Vec<f32>>,
        params: &SpeechGenerationParams,
        on_text: &mut dyn FnMut(&str, bool) -> bool,
    ) -> Result<String>;

    fn model_info(&self) -> Result<String>;

    fn loaded_params(&self) -> Option<&SpeechModelParams>;
}

struct LoadedSpeechModel {
    model: Box<dyn SpeechModel>,
    params: SpeechModelParams,
    _runtime: RuntimeHandle,
}

/// [`SpeechInference`] over a pluggable [`SpeechBackend`] and
/// [`AudioDecoder`]
pub struct SpeechInferenceInterface {
    backend: Arc<dyn SpeechBackend>,
    decoder: Box<dyn AudioDecoder>,
    loaded: Option<LoadedSpeechModel>,
}

impl SpeechInferenceInterface {
    /// Interface backed by the candle Whisper backend and the WAV decoder
    pub fn new() -> Self {
        Self::with_backend(Arc::new(CandleSpeechBackend))
    }

    pub fn with_backend(backend: Arc<dyn SpeechBackend>) -> Self {
        Self {
            backend,
            decoder: Box::new(WavDecoder),
            loaded: None,
        }
    }

    pub fn with_decoder(mut self, decoder: Box<dyn AudioDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn loaded_mut(&mut self) -> Result<&mut LoadedSpeechModel> {
        self.loaded.as_mut().ok_or(InferenceError::ModelNotLoaded)
    }

    fn run_window(
        &mut self,
        pcm: &[f32],
        params: &SpeechGenerationParams,
    ) -> Result<String> {
        let loaded = self.loaded_mut()?;
        let segments = loaded
            .model
            .transcribe(pcm, params)
            .map_err(InferenceError::backend)?;
        Ok(format_transcript(&segments, params.no_timestamps))
    }
}

impl Default for SpeechInferenceInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechInference for SpeechInferenceInterface {
    fn load_model(&mut self, params: SpeechModelParams) -> Result<()> {
        self.unload_model();
        params.validate()?;

        let runtime = RuntimeHandle::acquire();
        info!(
            "Loading speech model {} with {} backend ({} threads, gpu: {})",
            params.model_path.display(),
            self.backend.name(),
            params.n_threads,
            params.use_gpu
        );

        let model = self
            .backend
            .load(&params)
            .map_err(|e| InferenceError::load_failed(&params.model_path, e))?;

        info!("Speech model loaded: {}", model.describe());

        self.loaded = Some(LoadedSpeechModel {
            model,
            params,
            _runtime: runtime,
        });
        Ok(())
    }

    fn unload_model(&mut self) {
        if let Some(loaded) = self.loaded.take() {
            info!("Unloading speech model {}", loaded.params.model_path.display());
        }
    }

    fn is_model_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn transcribe_pcm(&mut self, pcm: &[f32], params: &SpeechGenerationParams) -> Result<String> {
        params.validate()?;
        self.loaded_mut()?;
        if pcm.is_empty() {
            return Err(InferenceError::EmptyAudio);
        }

        if let Some(path) = &params.save_audio_path {
            match write_wav(path, pcm) {
                Ok(()) => debug!("Saved input audio to {}", path.display()),
                Err(e) => warn!("Failed to save input audio: {}", e),
            }
        }

        let start = Instant::now();
        let transcript = self.run_window(pcm, params)?;
        debug!(
            samples = pcm.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Transcription finished"
        );

        if let Some(path) = &params.transcript_path {
            if let Err(e) = std::fs::write(path, &transcript) {
                warn!(
                    "Failed to open file '{}' for writing: {}",
                    path.display(),
                    e
                );
            }
        }

        Ok(transcript)
    }

    fn transcribe_file(&mut self, path: &Path, params: &SpeechGenerationParams) -> Result<String> {
        self.loaded_mut()?;
        let pcm = self.decoder.decode(path)?;
        self.transcribe_pcm(&pcm, params)
    }

    fn transcribe_stream(
        &mut self,
        chunks: &mut dyn Iterator<Item = Vec<f32>>,
        params: &SpeechGenerationParams,
        on_text: &mut dyn FnMut(&str, bool) -> bool,
    ) -> Result<String> {
        params.validate()?;
        self.loaded_mut()?.model.reset();

        let mut transcript = String::new();
        let mut recorded: Vec<f32> = Vec::new();
        let record = params.save_audio_path.is_some();

        if params.uses_vad() {
            debug!(
                vad_thold = params.vad_thold,
                freq_thold = params.freq_thold,
                "Streaming in voice-activity mode"
            );
            let mut gate = VadGate::new(params.length_ms, params.vad_thold, params.freq_thold);
            let mut stopped = false;
            for chunk in &mut *chunks {
                if record {
                    recorded.extend_from_slice(&chunk);
                }
                if let Some(utterance) = gate.push(&chunk) {
                    let text = self.run_window(&utterance, params)?;
                    transcript.push_str(&text);
                    if !on_text(&text, true) {
                        stopped = true;
                        break;
                    }
                }
            }
            if !stopped {
                if let Some(utterance) = gate.flush() {
                    let text = self.run_window(&utterance, params)?;
                    transcript.push_str(&text);
                    on_text(&text, true);
                }
            }
        } else {
            let mut window = SlidingWindow::new(params.step_ms, params.length_ms, params.keep_ms);
            let mut stopped = false;
            for chunk in &mut *chunks {
                if record {
                    recorded.extend_from_slice(&chunk);
                }
                window.push(&chunk);
                while let Some(next) = window.next_window() {
                    let text = self.run_window(&next.samples, params)?;
                    if next.completes_line {
                        transcript.push_str(&text);
                    }
                    if !on_text(&text, next.completes_line) {
                        stopped = true;
                        break;
                    }
                }
                if stopped {
                    break;
                }
            }
            if !stopped {
                if let Some(last) = window.flush() {
                    let text = self.run_window(&last.samples, params)?;
                    transcript.push_str(&text);
                    on_text(&text, true);
                }
            }
        }

        if let Some(path) = &params.save_audio_path {
            if !recorded.is_empty() {
                if let Err(e) = write_wav(path, &recorded) {
                    warn!("Failed to save streamed audio: {}", e);
                }
            }
        }
        if let Some(path) = &params.transcript_path {
            if let Err(e) = std::fs::write(path, &transcript) {
                warn!(
                    "Failed to open file '{}' for writing: {}",
                    path.display(),
                    e
                );
            }
        }

        Ok(transcript)
    }

    fn model_info(&self) -> Result<String> {
        let loaded = self.loaded.as_ref().ok_or(InferenceError::ModelNotLoaded)?;
        Ok(format!("{} [{}]", loaded.model.describe(), loaded.params))
    }

    fn loaded_params(&self) -> Option<&SpeechModelParams> {
        self.loaded.as_ref().map(|loaded| &loaded.params)
    }
}

impl std::fmt::Debug for SpeechInferenceInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechInferenceInterface")
            .field("backend", &self.backend.name())
            .field(
                "model",
                &self.loaded.as_ref().map(|l| l.params.model_path.display().to_string()),
            )
            .finish()
    }
}

/// `mm:ss.mmm`
fn format_timestamp(ms: i64) -> String {
    let ms = ms.max(0);
    format!("{:02}:{:02}.{:03}", ms / 60_000, (ms / 1000) % 60, ms % 1000)
}

/// Renders segments as plain text, or one `[start --> end] text` line each
pub fn format_transcript(segments: &[Segment], no_timestamps: bool) -> String {
    let mut out = String::new();
    for segment in segments {
        if no_timestamps {
            out.push_str(&segment.text);
            continue;
        }
        let _ = write!(
            out,
            "[{} --> {}] {}",
            format_timestamp(segment.start_ms),
            format_timestamp(segment.end_ms),
            segment.text.trim_start()
        );
        if segment.speaker_turn {
            out.push_str(" [SPEAKER_TURN]");
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioError;
    use crate::inference::mock::ScriptedSpeechBackend;
    use serial_test::serial;
    use tempfile::TempDir;

    struct SilentDecoder;

    impl AudioDecoder for SilentDecoder {
        fn decode(&self, path: &Path) -> std::result::Result<Vec<f32>, AudioError> {
            Err(AudioError::Empty {
                path: path.to_path_buf(),
            })
        }
    }

    fn loaded(backend: ScriptedSpeechBackend) -> SpeechInferenceInterface {
        let mut stt = SpeechInferenceInterface::with_backend(Arc::new(backend));
        stt.load_model(SpeechModelParams::new("whisper.gguf")).unwrap();
        stt
    }

    #[test]
    fn test_format_timestamps() {
        assert_eq!(format_timestamp(0), "00:00.000");
        assert_eq!(format_timestamp(61_234), "01:01.234");
    }

    #[test]
    fn test_format_transcript() {
        let mut turn = Segment::new(1500, 3000, " world");
        turn.speaker_turn = true;
        let segments = vec![Segment::new(0, 1500, " hello"), turn];

        assert_eq!(format_transcript(&segments, true), " hello world");
        assert_eq!(
            format_transcript(&segments, false),
            "[00:00.000 --> 00:01.500] hello\n[00:01.500 --> 00:03.000] world [SPEAKER_TURN]\n"
        );
    }

    #[test]
    fn test_unloaded_errors() {
        let mut stt = SpeechInferenceInterface::with_backend(Arc::new(ScriptedSpeechBackend::new()));
        let params = SpeechGenerationParams::default();
        let err = stt.transcribe_pcm(&[0.0; 16], &params).unwrap_err();
        assert_eq!(err.sentinel(), "[Error: Model not loaded]");
        assert!(stt
            .transcribe_file(Path::new("missing.wav"), &params)
            .unwrap_err()
            .is_model_not_loaded());
        stt.unload_model();
        stt.unload_model();
        assert!(!stt.is_model_loaded());
    }

    #[test]
    #[serial]
    fn test_empty_audio() {
        let mut stt = loaded(ScriptedSpeechBackend::new());
        let err = stt
            .transcribe_pcm(&[], &SpeechGenerationParams::default())
            .unwrap_err();
        assert!(matches!(err, InferenceError::EmptyAudio));
        assert_eq!(err.sentinel(), "[Error: No audio samples to transcribe]");
    }

    #[test]
    #[serial]
    fn test_transcribe_pcm_writes_outputs() {
        let dir = TempDir::new().unwrap();
        let transcript_path = dir.path().join("out.txt");
        let audio_path = dir.path().join("in.wav");
        let mut stt = loaded(ScriptedSpeechBackend::new());

        let params = SpeechGenerationParams::default()
            .with_transcript_path(&transcript_path)
            .with_save_audio(&audio_path);
        let text = stt.transcribe_pcm(&[0.1; 1600], &params).unwrap();

        assert_eq!(text, "[00:00.000 --> 00:01.000] hello\n");
        assert_eq!(std::fs::read_to_string(&transcript_path).unwrap(), text);
        assert!(audio_path.exists());
    }

    #[test]
    #[serial]
    fn test_unwritable_transcript_is_not_fatal() {
        let mut stt = loaded(ScriptedSpeechBackend::new());
        let params = SpeechGenerationParams::default()
            .with_timestamps(false)
            .with_transcript_path("/nonexistent/dir/out.txt");
        assert_eq!(stt.transcribe_pcm(&[0.1; 16], &params).unwrap(), " hello");
    }

    #[test]
    #[serial]
    fn test_transcribe_file_decode_failure() {
        let mut stt = loaded(ScriptedSpeechBackend::new()).with_decoder(Box::new(SilentDecoder));
        let err = stt
            .transcribe_file(Path::new("empty.wav"), &SpeechGenerationParams::default())
            .unwrap_err();
        assert!(matches!(err, InferenceError::Audio(AudioError::Empty { .. })));
        assert!(err.sentinel().starts_with("[Error: Failed to load audio file"));
    }

    #[test]
    #[serial]
    fn test_stream_sliding_windows() {
        let backend = ScriptedSpeechBackend::new();
        let mut stt = SpeechInferenceInterface::with_backend(Arc::new(backend));
        stt.load_model(SpeechModelParams::new("whisper.gguf")).unwrap();

        let params = SpeechGenerationParams::default()
            .with_timestamps(false)
            .with_window(1000, 3000, 0);
        let mut chunks = (0..5).map(|_| vec![0.1f32; 16_000]);
        let mut updates = Vec::new();
        let transcript = stt
            .transcribe_stream(&mut chunks, &params, &mut |text, final_line| {
                updates.push((text.to_string(), final_line));
                true
            })
            .unwrap();

        assert_eq!(updates.len(), 5);
        let finals = updates.iter().filter(|(_, f)| *f).count();
        assert_eq!(transcript, " hello".repeat(finals));
    }

    #[test]
    #[serial]
    fn test_stream_stops_on_false() {
        let mut stt = loaded(ScriptedSpeechBackend::new());
        let params = SpeechGenerationParams::default().with_window(1000, 3000, 0);
        let mut chunks = (0..10).map(|_| vec![0.1f32; 16_000]);
        let mut calls = 0;
        stt.transcribe_stream(&mut chunks, &params, &mut |_, _| {
            calls += 1;
            false
        })
        .unwrap();
        assert_eq!(calls, 1);
    }
}
