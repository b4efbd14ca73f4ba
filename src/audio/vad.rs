use super::{samples_for_ms, SAMPLE_RATE};

/// First-order high-pass filter, in place
pub fn high_pass_filter(data: &mut [f32], cutoff: f32, sample_rate: u32) {
    if data.is_empty() || cutoff <= 0.0 || sample_rate == 0 {
        return;
    }
    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff);
    let dt = 1.0 / sample_rate as f32;
    let alpha = dt / (rc + dt);

    let mut y = data[0];
    let mut prev = data[0];
    for sample in data.iter_mut().skip(1) {
        let x = *sample;
        y = alpha * (y + x - prev);
        prev = x;
        *sample = y;
    }
}

/// Energy-based end-of-speech detector.
///
/// Returns `true` when the trailing `last_ms` of `pcm` is quieter than
/// `vad_thold` times the average energy of the whole buffer, i.e. the
/// speaker paused. Returns `false` when the buffer is not longer than
/// `last_ms`.
pub fn vad_simple(pcm: &[f32], sample_rate: u32, last_ms: u32, vad_thold: f32, freq_thold: f32) -> bool {
    let n_samples = pcm.len();
    let n_samples_last = (sample_rate as usize * last_ms as usize) / 1000;
    if n_samples_last >= n_samples {
        return false;
    }

    let mut filtered = pcm.to_vec();
    if freq_thold > 0.0 {
        high_pass_filter(&mut filtered, freq_thold, sample_rate);
    }

    let energy_all = filtered.iter().map(|s| s.abs()).sum::<f32>() / n_samples as f32;
    let energy_last = filtered[n_samples - n_samples_last..]
        .iter()
        .map(|s| s.abs())
        .sum::<f32>()
        / n_samples_last as f32;

    energy_last <= vad_thold * energy_all
}

/// Accumulates live PCM and releases it once a pause follows speech
#[derive(Debug, Clone)]
pub struct VadGate {
    buffer: Vec<f32>,
    max_samples: usize,
    vad_thold: f32,
    freq_thold: f32,
}

/// Audio inspected before a pause can be detected
const MIN_BUFFER_MS: i32 = 2000;
/// Trailing audio that must be quiet
const PAUSE_MS: u32 = 1000;
/// Mean absolute amplitude below which a released buffer counts as silence
const SILENCE_ENERGY: f32 = 1e-4;

impl VadGate {
    pub fn new(length_ms: i32, vad_thold: f32, freq_thold: f32) -> Self {
        Self {
            buffer: Vec::new(),
            max_samples: samples_for_ms(length_ms.max(MIN_BUFFER_MS)),
            vad_thold,
            freq_thold,
        }
    }

    /// Appends `chunk`; returns the buffered utterance when a pause ends it
    pub fn push(&mut self, chunk: &[f32]) -> Option<Vec<f32>> {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() > self.max_samples {
            let excess = self.buffer.len() - self.max_samples;
            self.buffer.drain(..excess);
        }

        if self.buffer.len() < samples_for_ms(MIN_BUFFER_MS) {
            return None;
        }
        if !vad_simple(&self.buffer, SAMPLE_RATE, PAUSE_MS, self.vad_thold, self.freq_thold) {
            return None;
        }

        let utterance = std::mem::take(&mut self.buffer);
        (!is_silent(&utterance)).then_some(utterance)
    }

    /// Returns whatever is buffered at end of input
    pub fn flush(&mut self) -> Option<Vec<f32>> {
        let rest = std::mem::take(&mut self.buffer);
        (!rest.is_empty() && !is_silent(&rest)).then_some(rest)
    }
}

fn is_silent(pcm: &[f32]) -> bool {
    pcm.iter().map(|s| s.abs()).sum::<f32>() / (pcm.len().max(1) as f32) < SILENCE_ENERGY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(ms: i32, amplitude: f32) -> Vec<f32> {
        (0..samples_for_ms(ms))
            .map(|i| amplitude * (i as f32 * 2.0 * std::f32::consts::PI * 440.0 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    #[test]
    fn test_high_pass_removes_dc() {
        let mut data = vec![1.0f32; 16_000];
        high_pass_filter(&mut data, 100.0, SAMPLE_RATE);
        assert!(data[15_999].abs() < 1e-3);
    }

    #[test]
    fn test_vad_needs_enough_audio() {
        assert!(!vad_simple(&tone(500, 0.5), SAMPLE_RATE, 1000, 0.6, 100.0));
    }

    #[test]
    fn test_vad_detects_pause_after_speech() {
        let mut pcm = tone(2000, 0.5);
        pcm.extend(vec![0.0; samples_for_ms(1000)]);
        assert!(vad_simple(&pcm, SAMPLE_RATE, 1000, 0.6, 100.0));
    }

    #[test]
    fn test_vad_ongoing_speech() {
        assert!(!vad_simple(&tone(3000, 0.5), SAMPLE_RATE, 1000, 0.6, 100.0));
    }

    #[test]
    fn test_gate_releases_utterance() {
        let mut gate = VadGate::new(10_000, 0.6, 100.0);
        assert!(gate.push(&tone(2000, 0.5)).is_none());
        let utterance = gate.push(&vec![0.0; samples_for_ms(1000)]).unwrap();
        assert_eq!(utterance.len(), samples_for_ms(3000));
        assert!(gate.flush().is_none());
    }

    #[test]
    fn test_gate_drops_silence() {
        let mut gate = VadGate::new(10_000, 0.6, 100.0);
        assert!(gate.push(&vec![0.0; samples_for_ms(3000)]).is_none());
        assert!(gate.flush().is_none());
    }
}
