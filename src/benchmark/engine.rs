use super::catalog::{load_catalog, CatalogError, QuantizedModelInfo};
use super::report::{BenchmarkResult, BenchmarkSummary};
use crate::config::HearthConfig;
use crate::inference::{
    runtime, HardwareCapabilities, HardwareDetector, InferenceError, TextInference,
    TextInferenceInterface,
};
use crate::params::{GenerationParams, TextModelParams};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// Prompt of the discarded warm-up generation
pub const WARMUP_PROMPT: &str = "Hello";

/// Prompts cycled through by trial index
pub const DEFAULT_PROMPTS: [&str; 6] = [
    "What are the main advantages of using C++ for system programming?",
    "Where is Ouagadougou located?",
    "What is the capital of Burkina Faso?",
    "Write a short poem about Askia Mohammed.",
    "Explain the concept of recursion in programming with an example.",
    "What are the key differences between machine learning and deep learning?",
];

/// Builds a fresh text interface for each model
pub type InterfaceFactory = Box<dyn Fn() -> Box<dyn TextInference> + Send + Sync>;

/// Per-run settings
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkParams {
    pub n_gpu_layers: i32,
    pub repetitions: usize,
    pub warmup: bool,
    pub generation: GenerationParams,
}

impl Default for BenchmarkParams {
    fn default() -> Self {
        Self {
            n_gpu_layers: 0,
            repetitions: 10,
            warmup: true,
            generation: GenerationParams::default(),
        }
    }
}

impl BenchmarkParams {
    pub fn with_repetitions(mut self, repetitions: usize) -> Self {
        self.repetitions = repetitions;
        self
    }

    pub fn with_warmup(mut self, warmup: bool) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_gpu_layers(mut self, n_gpu_layers: i32) -> Self {
        self.n_gpu_layers = n_gpu_layers;
        self
    }

    pub fn with_generation(mut self, generation: GenerationParams) -> Self {
        self.generation = generation;
        self
    }
}

/// Benchmarks a list of candidate models one after another
pub struct Benchmarker {
    models: Vec<QuantizedModelInfo>,
    prompts: Vec<String>,
    base_dir: Option<PathBuf>,
    model_template: TextModelParams,
    factory: InterfaceFactory,
}

impl Benchmarker {
    /// Benchmarker over candle-backed interfaces with no base directory
    pub fn new() -> Self {
        Self::with_interface_factory(Box::new(|| {
            Box::new(TextInferenceInterface::new()) as Box<dyn TextInference>
        }))
    }

    pub fn with_interface_factory(factory: InterfaceFactory) -> Self {
        Self {
            models: Vec::new(),
            prompts: DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect(),
            base_dir: None,
            model_template: TextModelParams::default(),
            factory,
        }
    }

    /// Uses the configured models directory and text model settings
    pub fn from_config(config: &HearthConfig) -> Self {
        Self::new()
            .with_base_dir(&config.models_dir)
            .with_model_template(config.text_model.clone())
    }

    /// Directory relative catalog file names are resolved against
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Load parameters applied to every model; the path and GPU layers are
    /// overridden per run
    pub fn with_model_template(mut self, template: TextModelParams) -> Self {
        self.model_template = template;
        self
    }

    pub fn add_model(&mut self, model: QuantizedModelInfo) {
        self.models.push(model);
    }

    pub fn clear_models(&mut self) {
        self.models.clear();
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn model_ids(&self) -> Vec<String> {
        self.models.iter().map(|m| m.model_id.clone()).collect()
    }

    /// Replaces the model list with the catalog at `path`
    pub fn load_catalog(&mut self, path: &Path) -> Result<usize, CatalogError> {
        self.models = load_catalog(path)?;
        Ok(self.models.len())
    }

    /// Replaces the prompt set; an empty set keeps the current prompts
    pub fn set_prompts(&mut self, prompts: Vec<String>) {
        if prompts.is_empty() {
            warn!("Ignoring empty prompt set");
            return;
        }
        self.prompts = prompts;
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Benchmarks every model; failures are recorded, never propagated
    pub fn run(&self, params: &BenchmarkParams) -> BenchmarkSummary {
        let started_at = chrono::Utc::now();
        let hardware = runtime::hardware();

        info!(
            "Benchmarking {} models (GPU layers: {}, repetitions: {})",
            self.models.len(),
            params.n_gpu_layers,
            params.repetitions
        );

        let results = self
            .models
            .iter()
            .map(|model| {
                info!("Benchmarking: {}", model.model_id);
                let result = self.benchmark_model_on(model, params, &hardware);
                match &result.metrics.error_message {
                    Some(message) => warn!("  FAILED: {}", message),
                    None => info!(
                        "  {:.2} tokens/sec, TTFT {:.2} ms, P50 {:.2} ms",
                        result.metrics.avg_decode_tps,
                        result.metrics.avg_ttft_ms,
                        result.metrics.p50_latency_ms
                    ),
                }
                result
            })
            .collect();

        let summary = BenchmarkSummary::new(results, hardware, started_at);
        match &summary.winner {
            Some(winner) => info!("Fastest model (by decode TPS): {}", winner),
            None => info!("No single fastest model"),
        }
        info!("Success rate: {}/{}", summary.successful, summary.total);
        summary
    }

    /// Benchmarks one model
    pub fn benchmark_model(&self, model: &QuantizedModelInfo, params: &BenchmarkParams) -> BenchmarkResult {
        self.benchmark_model_on(model, params, &runtime::hardware())
    }

    fn benchmark_model_on(
        &self,
        model: &QuantizedModelInfo,
        params: &BenchmarkParams,
        hardware: &HardwareCapabilities,
    ) -> BenchmarkResult {
        let mut result = BenchmarkResult::new(&model.model_id);

        if !model.fits_in_memory(hardware) {
            result.metrics.fail(format!(
                "Model file ({:.1}GB) exceeds available RAM ({:.1}GB)",
                model.file_size as f64 / (1024.0 * 1024.0 * 1024.0),
                hardware.available_ram_gb()
            ));
            return result;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.run_trials(model, params, &mut result)
        }));
        match outcome {
            Ok(Ok(())) => result.metrics.success = true,
            Ok(Err(e)) => result.metrics.fail(e.to_string()),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Backend panicked while benchmarking {}: {}", model.model_id, message);
                result.metrics.fail(format!("Backend panicked: {}", message));
            }
        }

        result.metrics.finalize();
        result
    }

    fn run_trials(
        &self,
        model: &QuantizedModelInfo,
        params: &BenchmarkParams,
        result: &mut BenchmarkResult,
    ) -> Result<(), InferenceError> {
        let mut interface = (self.factory)();
        let mut model_params = self.model_template.clone();
        model_params.model_path = model.resolve_path(self.base_dir.as_deref());
        model_params.n_gpu_layers = params.n_gpu_layers;

        let load_start = Instant::now();
        interface.load_model(model_params)?;
        result.metrics.load_time_ms = load_start.elapsed().as_secs_f64() * 1000.0;
        result.metrics.record_memory(HardwareDetector::process_memory_bytes());

        if params.warmup {
            info!("  Running warmup...");
            interface.generate_completion(WARMUP_PROMPT, &params.generation)?;
        }

        for i in 0..params.repetitions {
            let prompt = &self.prompts[i % self.prompts.len()];
            let start = Instant::now();
            let completion = interface.generate_completion(prompt, &params.generation)?;
            let end_to_end_ms = start.elapsed().as_secs_f64() * 1000.0;

            result.metrics.record_trial(
                end_to_end_ms,
                completion.time_to_first_token_ms,
                completion.decode_tokens_per_second(),
            );
            result.metrics.record_memory(HardwareDetector::process_memory_bytes());

            if i == 0 {
                result.prompt_used = prompt.clone();
                result.generated_text = completion.text;
                result.metrics.tokens_generated = completion.tokens_generated;
            }
        }

        interface.unload_model();
        Ok(())
    }
}

impl Default for Benchmarker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Benchmarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Benchmarker")
            .field("models", &self.model_ids())
            .field("prompts", &self.prompts.len())
            .field("base_dir", &self.base_dir)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
