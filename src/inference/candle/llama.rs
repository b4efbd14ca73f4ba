//! Quantized GGUF language models (llama and qwen2 families)

use super::create_device;
use crate::inference::backend::{TextBackend, TextModel, Token};
use crate::inference::runtime;
use crate::params::TextModelParams;
use anyhow::{anyhow, bail, Context, Result};
use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor, D};
use candle_transformers::models::quantized_llama::{self, ModelWeights as QuantizedLlama};
use candle_transformers::models::quantized_qwen2::ModelWeights as QuantizedQwen2;
use std::fs::File;
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

/// End-of-turn markers used by common chat templates
const END_OF_TURN_TOKENS: &[&str] = &[
    "</s>",
    "<|eot_id|>",
    "<|end_of_text|>",
    "<|im_end|>",
    "<|endoftext|>",
    "<end_of_turn>",
];

/// Loads GGUF files with candle's quantized model implementations.
///
/// The tokenizer comes from a `tokenizer.json` next to the weights unless
/// [`TextModelParams::tokenizer_path`] says otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandleTextBackend;

impl TextBackend for CandleTextBackend {
    fn name(&self) -> &str {
        "candle-gguf"
    }

    fn load(&self, params: &TextModelParams) -> Result<Box<dyn TextModel>> {
        Ok(Box::new(CandleTextModel::load(params)?))
    }
}

enum GgufWeights {
    Llama(QuantizedLlama),
    Qwen2(QuantizedQwen2),
}

impl GgufWeights {
    fn load(path: &Path, device: &Device) -> Result<Self> {
        debug!("Loading GGUF model from: {}", path.display());

        let mut file = File::open(path).context("Failed to open GGUF model file")?;
        let content = gguf_file::Content::read(&mut file)
            .map_err(|e| anyhow!("Failed to read GGUF file: {}", e))?;
        let architecture = metadata_string(&content, "general.architecture")
            .unwrap_or_else(|| "llama".to_string());

        debug!("GGUF file loaded, initializing {} weights...", architecture);

        let weights = match architecture.as_str() {
            "qwen2" => GgufWeights::Qwen2(
                QuantizedQwen2::from_gguf(content, &mut file, device)
                    .context("Failed to load model weights from GGUF")?,
            ),
            "llama" | "mistral" => GgufWeights::Llama(
                QuantizedLlama::from_gguf(content, &mut file, device)
                    .context("Failed to load model weights from GGUF")?,
            ),
            other => bail!("Unsupported GGUF architecture: {}", other),
        };

        debug!("Model weights loaded successfully");
        Ok(weights)
    }

    fn forward(&mut self, input: &Tensor, pos: usize) -> candle_core::Result<Tensor> {
        match self {
            GgufWeights::Llama(model) => model.forward(input, pos),
            GgufWeights::Qwen2(model) => model.forward(input, pos),
        }
    }
}

/// Header facts read before any weights
struct GgufMetadata {
    architecture: String,
    name: Option<String>,
    context_length: Option<usize>,
    bos_token: Option<Token>,
    eos_token: Option<Token>,
}

fn metadata_string(content: &gguf_file::Content, key: &str) -> Option<String> {
    content
        .metadata
        .get(key)
        .and_then(|value| value.to_string().ok())
        .cloned()
}

fn metadata_u32(content: &gguf_file::Content, key: &str) -> Option<u32> {
    content.metadata.get(key).and_then(|value| value.to_u32().ok())
}

impl GgufMetadata {
    fn read(path: &Path) -> Result<Self> {
        let mut file = File::open(path).context("Failed to open GGUF model file")?;
        let content = gguf_file::Content::read(&mut file)
            .map_err(|e| anyhow!("Failed to read GGUF file: {}", e))?;

        let architecture = metadata_string(&content, "general.architecture")
            .unwrap_or_else(|| "llama".to_string());
        Ok(Self {
            name: metadata_string(&content, "general.name"),
            context_length: metadata_u32(&content, &format!("{}.context_length", architecture))
                .map(|n| n as usize),
            bos_token: metadata_u32(&content, "tokenizer.ggml.bos_token_id"),
            eos_token: metadata_u32(&content, "tokenizer.ggml.eos_token_id"),
            architecture,
        })
    }

    /// Dequantized `token_embd.weight`, `[vocab, hidden]` on the CPU
    fn embedding_table(path: &Path) -> Result<Tensor> {
        let mut file = File::open(path).context("Failed to open GGUF model file")?;
        let content = gguf_file::Content::read(&mut file)
            .map_err(|e| anyhow!("Failed to read GGUF file: {}", e))?;
        let table = content
            .tensor(&mut file, "token_embd.weight", &Device::Cpu)
            .context("Model has no token embedding table")?
            .dequantize(&Device::Cpu)?;
        Ok(table)
    }
}

/// A GGUF model plus its tokenizer
pub struct CandleTextModel {
    /// `None` when loaded with `vocab_only`
    weights: Option<GgufWeights>,
    tokenizer: Tokenizer,
    device: Device,
    embedding_table: Option<Tensor>,
    context_size: usize,
    bos_token: Option<Token>,
    end_tokens: Vec<Token>,
    description: String,
}

impl CandleTextModel {
    fn load(params: &TextModelParams) -> Result<Self> {
        let path = params.model_path.as_path();
        if !path.exists() {
            bail!("Model file not found: {}", path.display());
        }

        let tokenizer_path = params.resolved_tokenizer_path();
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            anyhow!(
                "Failed to load tokenizer {}: {}",
                tokenizer_path.display(),
                e
            )
        })?;

        let metadata = GgufMetadata::read(path)?;

        let mut context_size = params.n_ctx as usize;
        if let Some(trained) = metadata.context_length {
            if context_size > trained {
                warn!(
                    "Requested context {} exceeds the trained context {}, clamping",
                    context_size, trained
                );
                context_size = trained;
            }
        }
        if metadata.architecture != "qwen2" && context_size > quantized_llama::MAX_SEQ_LEN {
            warn!(
                "Context {} exceeds the backend limit {}, clamping",
                context_size,
                quantized_llama::MAX_SEQ_LEN
            );
            context_size = quantized_llama::MAX_SEQ_LEN;
        }

        if params.use_mlock || !params.use_mmap || params.tensor_split {
            debug!(
                use_mmap = params.use_mmap,
                use_mlock = params.use_mlock,
                tensor_split = params.tensor_split,
                "Memory placement flags are advisory for this backend"
            );
        }
        debug!(n_batch = params.n_batch, "Prompt is evaluated in a single batch");

        let hardware = runtime::hardware();
        let (weights, device) = if params.vocab_only {
            info!("Loading vocabulary only, generation is disabled");
            (None, Device::Cpu)
        } else {
            let device = create_device(params.n_gpu_layers > 0, params.main_gpu as usize, &hardware)?;
            info!(
                "Loading {} on {} device...",
                metadata.name.as_deref().unwrap_or(&metadata.architecture),
                if device.is_cpu() { "CPU".to_string() } else { hardware.best_device().to_string() }
            );

            // Try selected device first, fallback to CPU if it fails
            match GgufWeights::load(path, &device) {
                Ok(weights) => (Some(weights), device),
                Err(e) if !device.is_cpu() => {
                    warn!(
                        "Failed to load GGUF model on {}: {}. Falling back to CPU",
                        hardware.best_device(),
                        e
                    );
                    let weights = GgufWeights::load(path, &Device::Cpu)
                        .context("Failed to load GGUF model on CPU fallback")?;
                    (Some(weights), Device::Cpu)
                }
                Err(e) => return Err(e),
            }
        };

        let embedding_table = if params.embeddings {
            Some(GgufMetadata::embedding_table(path)?)
        } else {
            None
        };

        let mut end_tokens: Vec<Token> = metadata.eos_token.into_iter().collect();
        for marker in END_OF_TURN_TOKENS {
            if let Some(id) = tokenizer.token_to_id(marker) {
                if !end_tokens.contains(&id) {
                    end_tokens.push(id);
                }
            }
        }
        if end_tokens.is_empty() {
            warn!("No end-of-generation token found, generation stops only on budget");
        }

        let description = format!(
            "{} ({}, ctx {}, {})",
            metadata.name.as_deref().unwrap_or("unnamed"),
            metadata.architecture,
            context_size,
            if device.is_cpu() { "cpu" } else { "gpu" }
        );

        Ok(Self {
            weights,
            tokenizer,
            device,
            embedding_table,
            context_size,
            bos_token: metadata.bos_token,
            end_tokens,
            description,
        })
    }
}

impl TextModel for CandleTextModel {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    fn context_size(&self) -> usize {
        self.context_size
    }

    fn tokenize(&self, text: &str, add_bos: bool, parse_special: bool) -> Result<Vec<Token>> {
        if parse_special {
            debug!("Special tokens are always matched by the tokenizer's added vocabulary");
        }
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        let mut tokens = Vec::with_capacity(encoding.len() + 1);
        if add_bos {
            if let Some(bos) = self.bos_token {
                tokens.push(bos);
            }
        }
        tokens.extend_from_slice(encoding.get_ids());
        Ok(tokens)
    }

    fn detokenize(&self, tokens: &[Token]) -> Result<String> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Decoding failed: {}", e))
    }

    fn is_end_of_generation(&self, token: Token) -> bool {
        self.end_tokens.contains(&token)
    }

    fn forward(&mut self, tokens: &[Token], pos: usize) -> Result<Vec<f32>> {
        let weights = self
            .weights
            .as_mut()
            .ok_or_else(|| anyhow!("Model was loaded with vocab_only"))?;
        if pos + tokens.len() > self.context_size {
            bail!(
                "Position {} exceeds context of {}",
                pos + tokens.len(),
                self.context_size
            );
        }

        let input = Tensor::new(tokens, &self.device)?.unsqueeze(0)?;
        let logits = weights.forward(&input, pos)?;
        // Quantized models return [batch, vocab]; guard against [batch, seq, vocab]
        let logits = if logits.dims().len() == 3 {
            let seq_len = logits.dim(1)?;
            logits.narrow(1, seq_len - 1, 1)?.squeeze(1)?.squeeze(0)?
        } else {
            logits.squeeze(0)?
        };
        Ok(logits.to_dtype(DType::F32)?.to_vec1::<f32>()?)
    }

    fn embeddings(&mut self, tokens: &[Token]) -> Result<Vec<f32>> {
        let table = self
            .embedding_table
            .as_ref()
            .ok_or_else(|| anyhow!("Embedding table not loaded"))?;
        let ids = Tensor::new(tokens, &Device::Cpu)?;
        let pooled = table.index_select(&ids, 0)?.mean(0)?;
        let norm = pooled.sqr()?.sum(D::Minus1)?.sqrt()?.to_scalar::<f32>()?;
        let pooled = if norm > 0.0 {
            (pooled / f64::from(norm))?
        } else {
            pooled
        };
        Ok(pooled.to_dtype(DType::F32)?.to_vec1::<f32>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_model_file() {
        let err = CandleTextBackend
            .load(&TextModelParams::new("/nonexistent/model.gguf"))
            .err()
            .unwrap();
        assert!(format!("{:#}", err).contains("not found"));
    }

    #[test]
    fn test_missing_tokenizer() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("model.gguf");
        std::fs::write(&model, b"GGUF").unwrap();
        let err = CandleTextBackend.load(&TextModelParams::new(&model)).err().unwrap();
        assert!(format!("{:#}", err).contains("tokenizer"));
    }

    #[test]
    #[ignore] // Requires model files: HEARTH_TEST_GGUF pointing at a GGUF with tokenizer.json beside it
    fn test_real_model_generates_logits() {
        let path = std::env::var("HEARTH_TEST_GGUF").unwrap();
        let mut model = CandleTextBackend
            .load(&TextModelParams::new(path).with_context_size(256))
            .unwrap();
        let tokens = model.tokenize("Hello", true, false).unwrap();
        let logits = model.forward(&tokens, 0).unwrap();
        assert!(!logits.is_empty());
    }
}
