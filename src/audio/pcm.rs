/// Averages interleaved frames down to one channel
pub fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation resampler
pub fn resample_linear(audio: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if audio.is_empty() || src_rate == 0 || dst_rate == 0 || src_rate == dst_rate {
        return audio.to_vec();
    }

    let ratio = dst_rate as f64 / src_rate as f64;
    let out_len = ((audio.len() as f64) * ratio).round().max(1.0) as usize;
    let last = audio.len() - 1;

    (0..out_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let left = (src_pos.floor() as usize).min(last);
            let right = (left + 1).min(last);
            let frac = (src_pos - left as f64) as f32;
            audio[left] * (1.0 - frac) + audio[right] * frac
        })
        .collect()
}

/// Replaces non-finite samples with silence and clamps to `-1.0..=1.0`
pub fn sanitize(samples: &mut [f32]) {
    for sample in samples {
        *sample = if sample.is_finite() {
            sample.clamp(-1.0, 1.0)
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let mono = downmix(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_resample_halves_length() {
        let audio: Vec<f32> = (0..32).map(|i| i as f32).collect();
        let out = resample_linear(&audio, 32_000, 16_000);
        assert_eq!(out.len(), 16);
        assert_eq!(out[1], 2.0);
    }

    #[test]
    fn test_resample_same_rate_is_copy() {
        let audio = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&audio, 16_000, 16_000), audio);
    }

    #[test]
    fn test_sanitize() {
        let mut samples = vec![f32::NAN, 2.0, -3.0, 0.25];
        sanitize(&mut samples);
        assert_eq!(samples, vec![0.0, 1.0, -1.0, 0.25]);
    }
}
