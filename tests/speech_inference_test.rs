//! Integration tests for the speech inference interface and the audio
//! decode boundary

mod support;

use hearth::audio::{AudioDecoder, AudioError, WavDecoder, SAMPLE_RATE};
use hearth::inference::mock::ScriptedSpeechBackend;
use hearth::inference::{
    format_transcript, InferenceError, Segment, SpeechInference, SpeechInferenceInterface,
};
use hearth::params::{SpeechGenerationParams, SpeechModelParams};
use serial_test::serial;
use std::sync::Arc;
use support::{loaded_speech, tone, write_pcm16};
use tempfile::TempDir;

fn two_speakers() -> Vec<Segment> {
    let mut first = Segment::new(0, 1500, " Hello there.");
    first.speaker_turn = true;
    vec![first, Segment::new(1500, 62_250, " General Kenobi.")]
}

#[test]
fn test_transcript_format() {
    let text = format_transcript(&two_speakers(), false);
    assert_eq!(
        text,
        "[00:00.000 --> 00:01.500] Hello there. [SPEAKER_TURN]\n\
         [00:01.500 --> 01:02.250] General Kenobi.\n"
    );
    assert_eq!(
        format_transcript(&two_speakers(), true),
        " Hello there. General Kenobi."
    );
}

#[test]
#[serial]
fn test_unloaded_interface_rejects_audio() {
    let mut stt = SpeechInferenceInterface::with_backend(Arc::new(ScriptedSpeechBackend::new()));
    let params = SpeechGenerationParams::default();
    assert!(stt.transcribe_pcm(&tone(1.0), &params).unwrap_err().is_model_not_loaded());
    assert!(stt
        .transcribe_file(std::path::Path::new("missing.wav"), &params)
        .unwrap_err()
        .is_model_not_loaded());
    assert!(stt.model_info().is_err());
}

#[test]
#[serial]
fn test_empty_pcm_is_rejected() {
    let mut stt = loaded_speech(Arc::new(ScriptedSpeechBackend::new()));
    let err = stt
        .transcribe_pcm(&[], &SpeechGenerationParams::default())
        .unwrap_err();
    assert!(matches!(err, InferenceError::EmptyAudio));
}

#[test]
#[serial]
fn test_transcribe_file_resamples_and_downmixes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stereo.wav");
    // one second of 44.1 kHz stereo
    let samples: Vec<i16> = (0..44_100 * 2).map(|i| ((i % 100) * 100) as i16).collect();
    write_pcm16(&path, &samples, 2, 44_100);

    let backend = Arc::new(ScriptedSpeechBackend::new().with_segments(two_speakers()));
    let mut stt = loaded_speech(Arc::clone(&backend));
    let text = stt
        .transcribe_file(&path, &SpeechGenerationParams::default())
        .unwrap();

    assert!(text.contains("Hello there. [SPEAKER_TURN]"));
    let received = backend.received();
    assert_eq!(received.len(), 1);
    assert!((received[0] as i64 - SAMPLE_RATE as i64).abs() <= 1);
}

#[test]
#[serial]
fn test_undecodable_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("not-audio.wav");
    std::fs::write(&path, b"definitely not RIFF").unwrap();

    let mut stt = loaded_speech(Arc::new(ScriptedSpeechBackend::new()));
    let err = stt
        .transcribe_file(&path, &SpeechGenerationParams::default())
        .unwrap_err();
    assert!(matches!(err, InferenceError::Audio(_)));
    assert_eq!(
        err.sentinel(),
        format!("[Error: {}]", err)
    );
}

#[test]
fn test_decoder_reports_empty_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.wav");
    write_pcm16(&path, &[], 1, 16_000);
    assert!(matches!(
        WavDecoder.decode(&path),
        Err(AudioError::Empty { .. })
    ));
}

#[test]
#[serial]
fn test_transcript_and_audio_are_saved() {
    let dir = TempDir::new().unwrap();
    let transcript = dir.path().join("out.txt");
    let audio = dir.path().join("input.wav");

    let mut stt = loaded_speech(Arc::new(ScriptedSpeechBackend::new()));
    let params = SpeechGenerationParams::default()
        .with_transcript_path(&transcript)
        .with_save_audio(&audio);
    let text = stt.transcribe_pcm(&tone(0.5), &params).unwrap();

    assert_eq!(std::fs::read_to_string(&transcript).unwrap(), text);
    let saved = WavDecoder.decode(&audio).unwrap();
    assert_eq!(saved.len(), 8_000);
}

#[test]
#[serial]
fn test_unwritable_transcript_path_still_returns_text() {
    let dir = TempDir::new().unwrap();
    let transcript = dir.path().join("no-such-dir").join("out.txt");

    let mut stt = loaded_speech(Arc::new(ScriptedSpeechBackend::new()));
    let params = SpeechGenerationParams::default().with_transcript_path(&transcript);
    let text = stt.transcribe_pcm(&tone(0.5), &params).unwrap();

    assert_eq!(text, "[00:00.000 --> 00:01.000] hello\n");
    assert!(!transcript.exists());
}

#[test]
#[serial]
fn test_sliding_window_stream() {
    let backend = Arc::new(
        ScriptedSpeechBackend::new().with_segments(vec![Segment::new(0, 500, " word")]),
    );
    let mut stt = loaded_speech(Arc::clone(&backend));
    // step 1s, length 3s: a line is committed every second window
    let params = SpeechGenerationParams::default()
        .with_window(1000, 3000, 0)
        .with_timestamps(false);

    let mut chunks = (0..4).map(|_| tone(1.0));
    let mut updates = Vec::new();
    let transcript = stt
        .transcribe_stream(&mut chunks, &params, &mut |text, committed| {
            updates.push((text.to_string(), committed));
            true
        })
        .unwrap();

    assert_eq!(updates.len(), 4);
    assert_eq!(
        updates.iter().map(|(_, c)| *c).collect::<Vec<_>>(),
        vec![false, true, false, true]
    );
    assert_eq!(transcript, " word word");
    assert_eq!(backend.received().len(), 4);
}

#[test]
#[serial]
fn test_stream_stops_when_callback_declines() {
    let backend = Arc::new(ScriptedSpeechBackend::new());
    let mut stt = loaded_speech(Arc::clone(&backend));
    let params = SpeechGenerationParams::default().with_window(1000, 2000, 0);

    let mut chunks = (0..10).map(|_| tone(1.0));
    let mut calls = 0;
    stt.transcribe_stream(&mut chunks, &params, &mut |_, _| {
        calls += 1;
        false
    })
    .unwrap();

    assert_eq!(calls, 1);
    assert_eq!(backend.received().len(), 1);
}

#[test]
#[serial]
fn test_vad_stream_skips_silence() {
    let backend = Arc::new(ScriptedSpeechBackend::new());
    let mut stt = loaded_speech(Arc::clone(&backend));
    let params = SpeechGenerationParams::default().with_window(0, 5000, 0);

    let silence = vec![0.0f32; SAMPLE_RATE as usize / 2];
    let mut chunks = (0..8).map(|_| silence.clone());
    let transcript = stt
        .transcribe_stream(&mut chunks, &params, &mut |_, _| true)
        .unwrap();

    assert!(transcript.is_empty());
    assert!(backend.received().is_empty());
}

#[test]
#[serial]
fn test_vad_stream_releases_utterances() {
    let backend = Arc::new(ScriptedSpeechBackend::new());
    let mut stt = loaded_speech(Arc::clone(&backend));
    let params = SpeechGenerationParams::default()
        .with_window(0, 5000, 0)
        .with_timestamps(false);

    // speech, a pause that ends it, then trailing speech flushed at the end
    let silence = vec![0.0f32; SAMPLE_RATE as usize];
    let mut chunks = vec![tone(2.0), silence, tone(1.0)].into_iter();
    let mut updates = Vec::new();
    let transcript = stt
        .transcribe_stream(&mut chunks, &params, &mut |text, committed| {
            updates.push((text.to_string(), committed));
            true
        })
        .unwrap();

    assert_eq!(
        backend.received(),
        vec![3 * SAMPLE_RATE as usize, SAMPLE_RATE as usize]
    );
    assert!(updates.iter().all(|(_, committed)| *committed));
    assert_eq!(updates.len(), 2);
    assert_eq!(transcript, " hello hello");
}

#[test]
#[serial]
fn test_failed_load_leaves_unloaded() {
    let backend = ScriptedSpeechBackend::new().failing_for("broken.bin");
    let mut stt = SpeechInferenceInterface::with_backend(Arc::new(backend));
    let err = stt.load_model(SpeechModelParams::new("broken.bin")).unwrap_err();
    assert!(matches!(err, InferenceError::LoadFailed { .. }));
    assert!(!stt.is_model_loaded());
}
