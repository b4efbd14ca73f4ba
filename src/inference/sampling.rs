//! Token sampling.
//!
//! The chain runs in a fixed order that changes output distributions if
//! altered:
//!
//! 1. repetition, frequency and presence penalties over the last
//!    `penalty_last_n` accepted tokens
//! 2. top-k truncation
//! 3. top-p (nucleus) truncation
//! 4. temperature scaling (`0` short-circuits to arg-max)
//! 5. categorical draw

use super::backend::Token;
use crate::params::GenerationParams;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, VecDeque};

pub struct SamplerChain {
    temperature: f32,
    top_k: usize,
    top_p: f32,
    repeat_penalty: f32,
    penalty_freq: f32,
    penalty_present: f32,
    window: Option<usize>,
    history: VecDeque<Token>,
    rng: StdRng,
}

impl SamplerChain {
    pub fn new(params: &GenerationParams) -> Self {
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let window = match params.penalty_last_n {
            n if n < 0 => None,
            n => Some(n as usize),
        };
        Self {
            temperature: params.temperature,
            top_k: params.top_k.max(0) as usize,
            top_p: params.top_p,
            repeat_penalty: params.repeat_penalty,
            penalty_freq: params.penalty_freq,
            penalty_present: params.penalty_present,
            window,
            history: VecDeque::new(),
            rng,
        }
    }

    /// Records a generated token in the penalty window
    pub fn accept(&mut self, token: Token) {
        if self.window == Some(0) {
            return;
        }
        self.history.push_back(token);
        if let Some(limit) = self.window {
            while self.history.len() > limit {
                self.history.pop_front();
            }
        }
    }

    /// Picks the next token from raw logits
    pub fn sample(&mut self, logits: &[f32]) -> Token {
        let mut logits: Vec<f32> = logits
            .iter()
            .map(|&l| if l.is_nan() { f32::NEG_INFINITY } else { l })
            .collect();
        if logits.is_empty() {
            return 0;
        }

        self.apply_penalties(&mut logits);

        if self.temperature <= 0.0 && self.top_k == 0 && self.top_p >= 1.0 {
            return argmax(&logits);
        }

        let mut candidates: Vec<(Token, f32)> = logits
            .into_iter()
            .enumerate()
            .map(|(i, l)| (i as Token, l))
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

        if self.top_k > 0 && self.top_k < candidates.len() {
            candidates.truncate(self.top_k);
        }

        if self.top_p < 1.0 {
            let probs = softmax(&candidates);
            let mut cumulative = 0.0;
            let mut keep = candidates.len();
            for (i, p) in probs.iter().enumerate() {
                cumulative += p;
                if cumulative >= self.top_p {
                    keep = i + 1;
                    break;
                }
            }
            candidates.truncate(keep.max(1));
        }

        if self.temperature <= 0.0 {
            return candidates[0].0;
        }

        for candidate in candidates.iter_mut() {
            candidate.1 /= self.temperature;
        }

        let probs = softmax(&candidates);
        match WeightedIndex::new(&probs) {
            Ok(dist) => candidates[dist.sample(&mut self.rng)].0,
            Err(_) => candidates[0].0,
        }
    }

    fn apply_penalties(&self, logits: &mut [f32]) {
        if self.history.is_empty()
            || (self.repeat_penalty == 1.0 && self.penalty_freq == 0.0 && self.penalty_present == 0.0)
        {
            return;
        }

        let mut counts: HashMap<Token, usize> = HashMap::new();
        for &token in &self.history {
            *counts.entry(token).or_default() += 1;
        }

        for (token, count) in counts {
            let Some(logit) = logits.get_mut(token as usize) else {
                continue;
            };
            if *logit <= 0.0 {
                *logit *= self.repeat_penalty;
            } else {
                *logit /= self.repeat_penalty;
            }
            *logit -= count as f32 * self.penalty_freq + self.penalty_present;
        }
    }
}

fn argmax(logits: &[f32]) -> Token {
    logits
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i as Token)
        .unwrap_or(0)
}

/// Probabilities for candidates sorted by descending logit
fn softmax(candidates: &[(Token, f32)]) -> Vec<f32> {
    let max = candidates
        .iter()
        .map(|c| c.1)
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        let mut probs = vec![0.0; candidates.len()];
        if let Some(first) = probs.first_mut() {
            *first = 1.0;
        }
        return probs;
    }
    let exps: Vec<f32> = candidates.iter().map(|c| (c.1 - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
