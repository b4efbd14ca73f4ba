use super::error::AudioError;
use super::pcm::{downmix, resample_linear, sanitize};
use super::SAMPLE_RATE;
use std::path::Path;
use tracing::debug;

/// Turns an audio file into 16 kHz mono PCM.
///
/// Implementations return [`AudioError::Empty`] rather than an empty vector
/// when the file holds no frames.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<Vec<f32>, AudioError>;
}

/// WAV decoder: integer and float sample formats, any channel count, any
/// sample rate
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl AudioDecoder for WavDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<f32>, AudioError> {
        let mut reader = hound::WavReader::open(path).map_err(|e| map_hound(path, e))?;

        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let bits = u32::from(spec.bits_per_sample.max(1));
                let max_val = if bits > 1 {
                    ((1i64 << (bits - 1)) - 1) as f32
                } else {
                    1.0
                };
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / max_val))
                    .collect::<Result<_, _>>()
                    .map_err(|e| map_hound(path, e))?
            }
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| map_hound(path, e))?,
        };

        let mut pcm = resample_linear(&downmix(&samples, channels), spec.sample_rate, SAMPLE_RATE);
        sanitize(&mut pcm);

        debug!(
            "Decoded {}: {} Hz x {} ch -> {} samples",
            path.display(),
            spec.sample_rate,
            channels,
            pcm.len()
        );

        if pcm.is_empty() {
            return Err(AudioError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(pcm)
    }
}

fn map_hound(path: &Path, err: hound::Error) -> AudioError {
    let path = path.to_path_buf();
    match err {
        hound::Error::IoError(source) => AudioError::Io { path, source },
        hound::Error::Unsupported => AudioError::Unsupported {
            path,
            reason: "sample format not supported".to_string(),
        },
        other => AudioError::Decode {
            path,
            message: other.to_string(),
        },
    }
}

/// Writes 16 kHz mono PCM as a 32-bit float WAV file
pub fn write_wav(path: &Path, pcm: &[f32]) -> Result<(), AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| map_hound(path, e))?;
    for &sample in pcm {
        writer
            .write_sample(sample)
            .map_err(|e| map_hound(path, e))?;
    }
    writer.finalize().map_err(|e| map_hound(path, e))
}
