//! Audio decode boundary and PCM helpers.
//!
//! Everything handed to a speech model is 16 kHz mono `f32` PCM in
//! `-1.0..=1.0`. [`WavDecoder`] produces that from WAV files; the window and
//! VAD helpers slice live PCM into transcription requests.

mod error;
mod pcm;
mod vad;
mod wav;
mod window;

pub use error::AudioError;
pub use pcm::{downmix, resample_linear, sanitize};
pub use vad::{high_pass_filter, vad_simple, VadGate};
pub use wav::{write_wav, AudioDecoder, WavDecoder};
pub use window::{SlidingWindow, Window};

/// Sample rate every speech model consumes
pub const SAMPLE_RATE: u32 = 16_000;

/// Number of samples covering `ms` milliseconds at [`SAMPLE_RATE`]
pub fn samples_for_ms(ms: i32) -> usize {
    if ms <= 0 {
        0
    } else {
        ms as usize * SAMPLE_RATE as usize / 1000
    }
}

/// Duration of `samples` in milliseconds at [`SAMPLE_RATE`]
pub fn duration_ms(samples: usize) -> i64 {
    samples as i64 * 1000 / SAMPLE_RATE as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_conversions() {
        assert_eq!(samples_for_ms(1000), 16_000);
        assert_eq!(samples_for_ms(-5), 0);
        assert_eq!(duration_ms(8_000), 500);
    }
}
