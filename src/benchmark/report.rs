use super::metrics::BenchmarkMetrics;
use crate::inference::HardwareCapabilities;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::fmt;
use std::fs;
use std::path::Path;

/// Outcome of benchmarking one model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchmarkResult {
    pub model_id: String,
    pub metrics: BenchmarkMetrics,
    /// Prompt of the first trial
    pub prompt_used: String,
    /// Text produced by the first trial
    pub generated_text: String,
}

impl BenchmarkResult {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Default::default()
        }
    }

    /// Export record. Successful runs carry their metrics, failed runs
    /// their error message.
    pub fn to_json(&self) -> Value {
        let mut record = json!({
            "model_id": self.model_id,
            "success": self.metrics.success,
            "prompt_used": self.prompt_used,
        });
        if self.metrics.success {
            let m = &self.metrics;
            record["generated_text"] = json!(self.generated_text);
            record["metrics"] = json!({
                "load_time_ms": m.load_time_ms,
                "peak_memory_bytes": m.peak_memory_bytes,
                "tokens_generated": m.tokens_generated,
                "avg_ttft_ms": m.avg_ttft_ms,
                "avg_decode_tps": m.avg_decode_tps,
                "avg_end_to_end_latency_ms": m.avg_end_to_end_latency_ms,
                "latency_stdev_ms": m.latency_stdev_ms,
                "p50_latency_ms": m.p50_latency_ms,
                "p95_latency_ms": m.p95_latency_ms,
                "p99_latency_ms": m.p99_latency_ms,
                "ttft_history": m.ttft_history,
                "end_to_end_latency_history": m.end_to_end_latency_history,
                "decode_tps_history": m.decode_tps_history,
            });
        } else {
            record["error_message"] = json!(self.metrics.error_message.as_deref().unwrap_or(""));
        }
        record
    }
}

/// All results of one run plus the fastest model
#[derive(Debug, Clone)]
pub struct BenchmarkSummary {
    pub results: Vec<BenchmarkResult>,
    /// Successful model with the strictly highest average decode rate
    pub winner: Option<String>,
    pub successful: usize,
    pub total: usize,
    pub hardware: HardwareCapabilities,
    pub started_at: DateTime<Utc>,
}

impl BenchmarkSummary {
    pub fn new(
        results: Vec<BenchmarkResult>,
        hardware: HardwareCapabilities,
        started_at: DateTime<Utc>,
    ) -> Self {
        let successful = results.iter().filter(|r| r.metrics.success).count();
        let total = results.len();
        let winner = pick_winner(&results);
        Self {
            results,
            winner,
            successful,
            total,
            hardware,
            started_at,
        }
    }

    /// Fraction of models that completed; 0.0 for an empty run
    pub fn success_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64
        }
    }

    pub fn result(&self, model_id: &str) -> Option<&BenchmarkResult> {
        self.results.iter().find(|r| r.model_id == model_id)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "started_at": self.started_at.to_rfc3339(),
            "hardware": self.hardware,
            "winner": self.winner,
            "successful": self.successful,
            "total": self.total,
            "results": self.results.iter().map(BenchmarkResult::to_json).collect::<Vec<_>>(),
        })
    }

    /// Writes the pretty-printed export to `path`
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(&self.to_json()).map_err(std::io::Error::other)?;
        fs::write(path, text)
    }
}

fn pick_winner(results: &[BenchmarkResult]) -> Option<String> {
    let mut best: Option<&BenchmarkResult> = None;
    let mut tied = false;
    for result in results.iter().filter(|r| r.metrics.success) {
        match best {
            Some(current) if result.metrics.avg_decode_tps == current.metrics.avg_decode_tps => {
                tied = true;
            }
            Some(current) if result.metrics.avg_decode_tps < current.metrics.avg_decode_tps => {}
            _ => {
                best = Some(result);
                tied = false;
            }
        }
    }
    if tied {
        None
    } else {
        best.map(|r| r.model_id.clone())
    }
}

impl fmt::Display for BenchmarkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Benchmark Summary ===")?;
        writeln!(
            f,
            "Hardware: {} cores, {:.1}GB RAM available, CUDA: {}, Metal: {}",
            self.hardware.cpu_cores,
            self.hardware.available_ram_gb(),
            self.hardware.cuda_available,
            self.hardware.metal_available
        )?;
        for result in &self.results {
            let m = &result.metrics;
            if m.success {
                writeln!(f, "{}:", result.model_id)?;
                writeln!(f, "  Load time: {:.2} ms", m.load_time_ms)?;
                if let Some(peak) = m.peak_memory_bytes {
                    writeln!(f, "  Peak memory: {:.1} MB", peak as f64 / (1024.0 * 1024.0))?;
                }
                writeln!(f, "  Avg TTFT: {:.2} ms", m.avg_ttft_ms)?;
                writeln!(f, "  Avg decode: {:.2} tokens/sec", m.avg_decode_tps)?;
                writeln!(
                    f,
                    "  Latency: avg {:.2} ms, stdev {:.2} ms",
                    m.avg_end_to_end_latency_ms, m.latency_stdev_ms
                )?;
                writeln!(
                    f,
                    "  P50/P95/P99: {:.2} / {:.2} / {:.2} ms",
                    m.p50_latency_ms, m.p95_latency_ms, m.p99_latency_ms
                )?;
            } else {
                writeln!(
                    f,
                    "{}: FAILED ({})",
                    result.model_id,
                    m.error_message.as_deref().unwrap_or("unknown error")
                )?;
            }
        }
        match &self.winner {
            Some(winner) => writeln!(f, "Fastest model (by decode TPS): {}", winner)?,
            None => writeln!(f, "Fastest model (by decode TPS): none")?,
        }
        write!(f, "Success rate: {}/{}", self.successful, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hardware() -> HardwareCapabilities {
        HardwareCapabilities {
            total_ram_bytes: 16 << 30,
            available_ram_bytes: 8 << 30,
            cuda_available: false,
            metal_available: false,
            cpu_cores: 8,
            cpu_brand: None,
        }
    }

    fn succeeded(id: &str, tps: f64) -> BenchmarkResult {
        let mut result = BenchmarkResult::new(id);
        result.metrics.success = true;
        result.metrics.record_trial(100.0, 10.0, tps);
        result.metrics.finalize();
        result
    }

    fn failed(id: &str) -> BenchmarkResult {
        let mut result = BenchmarkResult::new(id);
        result.metrics.fail("load failed");
        result
    }

    #[test]
    fn test_winner_is_fastest_success() {
        let summary = BenchmarkSummary::new(
            vec![succeeded("slow", 10.0), succeeded("fast", 25.0), failed("broken")],
            hardware(),
            Utc::now(),
        );
        assert_eq!(summary.winner.as_deref(), Some("fast"));
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.total, 3);
    }

    #[test]
    fn test_tie_has_no_winner() {
        let summary = BenchmarkSummary::new(
            vec![succeeded("a", 20.0), succeeded("b", 20.0), succeeded("c", 5.0)],
            hardware(),
            Utc::now(),
        );
        assert!(summary.winner.is_none());
    }

    #[test]
    fn test_tie_broken_by_later_faster_model() {
        let summary = BenchmarkSummary::new(
            vec![succeeded("a", 20.0), succeeded("b", 20.0), succeeded("c", 30.0)],
            hardware(),
            Utc::now(),
        );
        assert_eq!(summary.winner.as_deref(), Some("c"));
    }

    #[test]
    fn test_no_success_no_winner() {
        let summary = BenchmarkSummary::new(vec![failed("x")], hardware(), Utc::now());
        assert!(summary.winner.is_none());
        assert_eq!(summary.success_ratio(), 0.0);
    }

    #[test]
    fn test_empty_run() {
        let summary = BenchmarkSummary::new(Vec::new(), hardware(), Utc::now());
        assert_eq!(summary.success_ratio(), 0.0);
        assert!(summary.to_string().contains("Success rate: 0/0"));
    }

    #[test]
    fn test_export_shape() {
        let ok = succeeded("ok", 12.0).to_json();
        assert_eq!(ok["success"], json!(true));
        assert!(ok["metrics"]["avg_decode_tps"].is_number());
        assert!(ok.get("error_message").is_none());

        let bad = failed("bad").to_json();
        assert_eq!(bad["error_message"], json!("load failed"));
        assert!(bad.get("metrics").is_none());
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let summary =
            BenchmarkSummary::new(vec![succeeded("m", 1.0), failed("n")], hardware(), Utc::now());
        summary.write_json(&path).unwrap();

        let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["results"].as_array().unwrap().len(), 2);
        assert_eq!(value["winner"], json!("m"));
    }
}
