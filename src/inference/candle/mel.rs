//! Slaney-style mel filterbank matching the one Whisper was trained with

fn hertz_to_mel(freq: f32) -> f32 {
    let min_log_hertz = 1000.0;
    let min_log_mel = 15.0;
    let logstep = 27.0 / (6.4f32).ln();

    if freq < min_log_hertz {
        3.0 * freq / 200.0
    } else {
        min_log_mel + (freq / min_log_hertz).ln() * logstep
    }
}

fn mel_to_hertz(mel: f32) -> f32 {
    let min_log_hertz = 1000.0;
    let min_log_mel = 15.0;
    let logstep = (6.4f32).ln() / 27.0;

    if mel < min_log_mel {
        200.0 * mel / 3.0
    } else {
        min_log_hertz * ((mel - min_log_mel) * logstep).exp()
    }
}

/// Row-major `[n_mels, n_fft / 2 + 1]` triangular filters from 0 Hz to
/// Nyquist, area-normalised
pub fn mel_filters(sample_rate: usize, n_fft: usize, n_mels: usize) -> Vec<f32> {
    let n_freqs = n_fft / 2 + 1;
    let mel_max = hertz_to_mel(sample_rate as f32 / 2.0);

    let hz_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hertz(mel_max * i as f32 / (n_mels + 1) as f32))
        .collect();

    let mut filters = vec![0f32; n_mels * n_freqs];
    for m in 0..n_mels {
        let (left, center, right) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
        let enorm = 2.0 / (right - left);
        for k in 0..n_freqs {
            let freq = k as f32 * sample_rate as f32 / n_fft as f32;
            let lower = (freq - left) / (center - left);
            let upper = (right - freq) / (right - center);
            filters[m * n_freqs + k] = lower.min(upper).max(0.0) * enorm;
        }
    }
    filters
}
