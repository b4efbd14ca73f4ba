use serde::Serialize;

/// Arithmetic mean; 0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Nearest-rank percentile over a sorted copy: index `floor(p * (n - 1))`.
/// 0 for an empty slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let index = (p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64).floor() as usize;
    sorted[index]
}

/// Sample standard deviation (n - 1); 0 for fewer than two values
pub fn stdev(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Measurements for one model
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BenchmarkMetrics {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub load_time_ms: f64,
    /// Highest resident set size sampled while the model was loaded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_memory_bytes: Option<u64>,
    /// Tokens produced by the first trial
    pub tokens_generated: usize,

    pub ttft_history: Vec<f64>,
    pub end_to_end_latency_history: Vec<f64>,
    pub decode_tps_history: Vec<f64>,

    pub avg_ttft_ms: f64,
    pub avg_decode_tps: f64,
    pub avg_end_to_end_latency_ms: f64,
    pub latency_stdev_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
}

impl BenchmarkMetrics {
    /// Records one trial
    pub fn record_trial(&mut self, end_to_end_ms: f64, ttft_ms: f64, decode_tps: f64) {
        self.end_to_end_latency_history.push(end_to_end_ms);
        self.ttft_history.push(ttft_ms);
        self.decode_tps_history.push(decode_tps);
    }

    pub fn record_memory(&mut self, rss: Option<u64>) {
        if let Some(rss) = rss {
            self.peak_memory_bytes = Some(self.peak_memory_bytes.map_or(rss, |peak| peak.max(rss)));
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.success = false;
        self.error_message = Some(message.into());
    }

    /// Derives means, spread and percentiles from the histories.
    /// Percentiles need more than one sample.
    pub fn finalize(&mut self) {
        self.avg_ttft_ms = mean(&self.ttft_history);
        self.avg_decode_tps = mean(&self.decode_tps_history);
        self.avg_end_to_end_latency_ms = mean(&self.end_to_end_latency_history);
        self.latency_stdev_ms = stdev(&self.end_to_end_latency_history);

        let latencies = &self.end_to_end_latency_history;
        if latencies.len() > 1 {
            self.p50_latency_ms = percentile(latencies, 0.50);
            self.p95_latency_ms = percentile(latencies, 0.95);
            self.p99_latency_ms = percentile(latencies, 0.99);
        }
    }
}
