//! Empirical model selection.
//!
//! [`Benchmarker`] loads each catalog entry in turn, runs a fixed prompt
//! set against it and records latency and throughput. The
//! [`BenchmarkSummary`] names the model with the highest mean decode speed.

mod catalog;
mod engine;
mod metrics;
mod report;

pub use catalog::{load_catalog, CatalogError, QuantizedModelInfo};
pub use engine::{BenchmarkParams, Benchmarker, InterfaceFactory, DEFAULT_PROMPTS, WARMUP_PROMPT};
pub use metrics::{mean, percentile, stdev, BenchmarkMetrics};
pub use report::{BenchmarkResult, BenchmarkSummary};
