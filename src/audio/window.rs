use super::samples_for_ms;

/// One transcription request cut from a live stream
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub samples: Vec<f32>,
    /// The transcript line is final; the next window starts a new one
    pub completes_line: bool,
}

/// Fixed-step sliding window over live PCM.
///
/// Every `step` of new audio is transcribed together with up to
/// `keep + length - step` of preceding audio. After `length / step - 1`
/// steps the line is committed and only `keep` of trailing audio carries
/// over.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    step: usize,
    length: usize,
    keep: usize,
    lines_every: usize,
    pending: Vec<f32>,
    previous: Vec<f32>,
    steps: usize,
}

impl SlidingWindow {
    pub fn new(step_ms: i32, length_ms: i32, keep_ms: i32) -> Self {
        let step = samples_for_ms(step_ms).max(1);
        let length = samples_for_ms(length_ms).max(step);
        let keep = samples_for_ms(keep_ms).min(step);
        let lines_every = if step_ms > 0 {
            ((length_ms / step_ms) - 1).max(1) as usize
        } else {
            1
        };
        Self {
            step,
            length,
            keep,
            lines_every,
            pending: Vec::new(),
            previous: Vec::new(),
            steps: 0,
        }
    }

    pub fn push(&mut self, chunk: &[f32]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Next window once a full step of new audio is buffered
    pub fn next_window(&mut self) -> Option<Window> {
        if self.pending.len() < self.step {
            return None;
        }
        let fresh = std::mem::take(&mut self.pending);
        Some(self.assemble(fresh))
    }

    /// Final window from whatever is buffered at end of input
    pub fn flush(&mut self) -> Option<Window> {
        if self.pending.is_empty() {
            return None;
        }
        let fresh = std::mem::take(&mut self.pending);
        let mut window = self.assemble(fresh);
        window.completes_line = true;
        Some(window)
    }

    fn assemble(&mut self, fresh: Vec<f32>) -> Window {
        let take = self
            .previous
            .len()
            .min((self.keep + self.length).saturating_sub(fresh.len()));
        let mut samples = Vec::with_capacity(take + fresh.len());
        samples.extend_from_slice(&self.previous[self.previous.len() - take..]);
        samples.extend(fresh);

        self.steps += 1;
        let completes_line = self.steps % self.lines_every == 0;
        self.previous = if completes_line {
            samples[samples.len().saturating_sub(self.keep)..].to_vec()
        } else {
            samples.clone()
        };

        Window {
            samples,
            completes_line,
        }
    }
}
