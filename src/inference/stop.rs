//! Stop-sequence detection over streamed text.
//!
//! Text is released to the caller only once it can no longer be the start
//! of a stop sequence, so a streaming consumer never sees a partial stop
//! sequence that is later cut off.

/// What to do after feeding a piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Keep generating; `ready` is safe to emit
    Continue { ready: String },
    /// A stop sequence matched; `ready` is the last text before it
    Stopped { ready: String },
}

#[derive(Debug, Default)]
pub struct StopSequenceMatcher {
    stops: Vec<String>,
    longest: usize,
    text: String,
    emitted: usize,
    cut: Option<usize>,
}

impl StopSequenceMatcher {
    pub fn new(stops: &[String]) -> Self {
        let stops: Vec<String> = stops.iter().filter(|s| !s.is_empty()).cloned().collect();
        let longest = stops.iter().map(|s| s.len()).max().unwrap_or(0);
        Self {
            stops,
            longest,
            ..Default::default()
        }
    }

    pub fn push(&mut self, piece: &str) -> StopOutcome {
        if self.cut.is_some() {
            return StopOutcome::Stopped {
                ready: String::new(),
            };
        }

        let scan_from = floor_char_boundary(
            &self.text,
            self.text.len().saturating_sub(self.longest.saturating_sub(1)),
        );
        self.text.push_str(piece);

        let hit = self
            .stops
            .iter()
            .filter_map(|stop| self.text[scan_from..].find(stop.as_str()))
            .min()
            .map(|offset| scan_from + offset);

        if let Some(cut) = hit {
            let ready = self.text[self.emitted..cut].to_string();
            self.emitted = cut;
            self.cut = Some(cut);
            return StopOutcome::Stopped { ready };
        }

        let safe = self.text.len() - self.pending_prefix_len();
        let ready = self.text[self.emitted..safe].to_string();
        self.emitted = safe;
        StopOutcome::Continue { ready }
    }

    /// Releases text held back as a possible stop prefix
    pub fn finish(&mut self) -> String {
        let end = self.cut.unwrap_or(self.text.len());
        let rest = self.text[self.emitted..end].to_string();
        self.emitted = end;
        rest
    }

    /// Accumulated text, ending before the stop sequence when one matched
    pub fn text(&self) -> &str {
        &self.text[..self.cut.unwrap_or(self.text.len())]
    }

    /// Byte offset of the matched stop sequence
    pub fn cut(&self) -> Option<usize> {
        self.cut
    }

    pub fn total_len(&self) -> usize {
        self.text.len()
    }

    /// Length of the longest suffix that is a proper prefix of a stop sequence
    fn pending_prefix_len(&self) -> usize {
        let max = self
            .longest
            .saturating_sub(1)
            .min(self.text.len() - self.emitted);
        (1..=max)
            .rev()
            .find(|&k| {
                let start = self.text.len() - k;
                self.text.is_char_boundary(start)
                    && self
                        .stops
                        .iter()
                        .any(|stop| stop.starts_with(&self.text[start..]))
            })
            .unwrap_or(0)
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stops(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn ready(outcome: StopOutcome) -> String {
        match outcome {
            StopOutcome::Continue { ready } | StopOutcome::Stopped { ready } => ready,
        }
    }

    #[test]
    fn test_no_stops_passes_through() {
        let mut matcher = StopSequenceMatcher::new(&[]);
        assert_eq!(
            matcher.push("hello"),
            StopOutcome::Continue {
                ready: "hello".into()
            }
        );
        assert_eq!(matcher.finish(), "");
        assert_eq!(matcher.text(), "hello");
    }

    #[test]
    fn test_stop_within_single_piece() {
        let mut matcher = StopSequenceMatcher::new(&stops(&["STOP"]));
        assert_eq!(
            matcher.push("abcSTOPdef"),
            StopOutcome::Stopped { ready: "abc".into() }
        );
        assert_eq!(matcher.text(), "abc");
        assert_eq!(matcher.cut(), Some(3));
    }

    #[test]
    fn test_stop_split_across_pieces_is_held_back() {
        let mut matcher = StopSequenceMatcher::new(&stops(&["STOP"]));
        assert_eq!(ready(matcher.push("one ST")), "one ");
        assert_eq!(
            matcher.push("OP two"),
            StopOutcome::Stopped { ready: "".into() }
        );
        assert_eq!(matcher.text(), "one ");
    }

    #[test]
    fn test_false_prefix_is_released() {
        let mut matcher = StopSequenceMatcher::new(&stops(&["STOP"]));
        assert_eq!(ready(matcher.push("ST")), "");
        assert_eq!(ready(matcher.push("AR")), "STAR");
    }

    #[test]
    fn test_finish_flushes_held_text() {
        let mut matcher = StopSequenceMatcher::new(&stops(&["</s>"]));
        assert_eq!(ready(matcher.push("end </")), "end ");
        assert_eq!(matcher.finish(), "</");
        assert_eq!(matcher.text(), "end </");
    }

    #[test]
    fn test_earliest_of_several_stops_wins() {
        let mut matcher = StopSequenceMatcher::new(&stops(&["world", "lo"]));
        assert_eq!(
            matcher.push("hello world"),
            StopOutcome::Stopped { ready: "hel".into() }
        );
    }

    #[test]
    fn test_multibyte_text_near_boundary() {
        let mut matcher = StopSequenceMatcher::new(&stops(&["ßx"]));
        assert_eq!(ready(matcher.push("aß")), "a");
        assert_eq!(ready(matcher.push("y")), "ßy");
    }

    #[test]
    fn test_push_after_stop_is_noop() {
        let mut matcher = StopSequenceMatcher::new(&stops(&["x"]));
        matcher.push("ax");
        assert_eq!(
            matcher.push("more"),
            StopOutcome::Stopped { ready: "".into() }
        );
        assert_eq!(matcher.text(), "a");
    }

    #[test]
    fn test_empty_stop_sequences_are_ignored() {
        let mut matcher = StopSequenceMatcher::new(&stops(&[""]));
        assert_eq!(ready(matcher.push("abc")), "abc");
    }
}
