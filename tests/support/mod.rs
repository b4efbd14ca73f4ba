use hearth::inference::mock::{ScriptedSpeechBackend, ScriptedTextBackend};
use hearth::inference::{
    SpeechInference, SpeechInferenceInterface, TextInference, TextInferenceInterface,
};
use hearth::AIService;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Text interface over the scripted backend, already loaded
#[allow(dead_code)]
pub fn loaded_text(backend: ScriptedTextBackend) -> TextInferenceInterface {
    let mut llm = TextInferenceInterface::with_backend(Arc::new(backend));
    llm.load_model(hearth::params::TextModelParams::new("scripted.gguf"))
        .unwrap();
    llm
}

/// Speech interface over the scripted backend, already loaded
#[allow(dead_code)]
pub fn loaded_speech(backend: Arc<ScriptedSpeechBackend>) -> SpeechInferenceInterface {
    let mut stt = SpeechInferenceInterface::with_backend(backend);
    stt.load_model(hearth::params::SpeechModelParams::new("scripted-whisper.gguf"))
        .unwrap();
    stt
}

/// Service whose interfaces run the scripted backends; nothing loaded yet
#[allow(dead_code)]
pub fn scripted_service(text: ScriptedTextBackend, speech: ScriptedSpeechBackend) -> AIService {
    AIService::with_interfaces(
        Box::new(TextInferenceInterface::with_backend(Arc::new(text))),
        Box::new(SpeechInferenceInterface::with_backend(Arc::new(speech))),
    )
}

/// `seconds` of a 440 Hz tone at 16 kHz
#[allow(dead_code)]
pub fn tone(seconds: f32) -> Vec<f32> {
    let n = (seconds * 16_000.0) as usize;
    (0..n)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16_000.0).sin())
        .collect()
}

/// Writes a 16-bit PCM WAV with the given layout
#[allow(dead_code)]
pub fn write_pcm16(path: &Path, samples: &[i16], channels: u16, sample_rate: u32) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
}

/// Writes a JSON model catalog into `dir` and returns its path
#[allow(dead_code)]
pub fn write_catalog(dir: &Path, json: &str) -> PathBuf {
    let path = dir.join("models.json");
    std::fs::write(&path, json).unwrap();
    path
}
