//! Model loading and management
//!
//! Handles downloading seq2seq checkpoints from HuggingFace Hub and loading them into memory.

use anyhow::{anyhow, bail, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::t5::{self, T5ForConditionalGeneration};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::path::PathBuf;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{info, warn};

use crate::sampling::SamplingConfig;

/// Configuration for model loading
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// HuggingFace model ID (e.g., "google/flan-t5-large")
    pub model_id: String,
    /// Model revision/branch
    pub revision: String,
    /// Data type for model weights
    pub dtype: DType,
    /// Prompts longer than this are truncated by the tokenizer
    pub max_input_tokens: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::flan_t5_large()
    }
}

impl ModelConfig {
    pub fn flan_t5_large() -> Self {
        Self::with_model_id("google/flan-t5-large")
    }

    pub fn flan_t5_small() -> Self {
        Self::with_model_id("google/flan-t5-small")
    }

    pub fn with_model_id(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            revision: "main".to_string(),
            // T5 activations overflow in F16
            dtype: DType::F32,
            max_input_tokens: 512,
        }
    }
}

/// Loaded model ready for inference
pub struct LoadedModel {
    pub model: T5ForConditionalGeneration,
    pub tokenizer: Tokenizer,
    pub config: t5::Config,
    pub device: Device,
    pub dtype: DType,
}

impl LoadedModel {
    /// First token fed to the decoder
    pub fn decoder_start_token_id(&self) -> u32 {
        self.config
            .decoder_start_token_id
            .unwrap_or(self.config.pad_token_id) as u32
    }

    pub fn eos_token_id(&self) -> u32 {
        self.config.eos_token_id as u32
    }

    /// Get vocab size
    pub fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    /// Get hidden size
    pub fn hidden_size(&self) -> usize {
        self.config.d_model
    }

    /// Get number of encoder layers
    pub fn num_layers(&self) -> usize {
        self.config.num_layers
    }
}

/// Pick the accelerator if one is compiled in and present, otherwise the CPU.
pub fn select_device(force_cpu: bool) -> Result<Device> {
    if force_cpu {
        return Ok(Device::Cpu);
    }
    if candle_core::utils::cuda_is_available() {
        Ok(Device::new_cuda(0)?)
    } else if candle_core::utils::metal_is_available() {
        Ok(Device::new_metal(0)?)
    } else {
        Ok(Device::Cpu)
    }
}

/// Load safetensors files, falling back to the shard index when there is no single file
fn load_safetensors(api: &hf_hub::api::sync::ApiRepo) -> Result<Vec<PathBuf>> {
    match api.get("model.safetensors") {
        Ok(path) => return Ok(vec![path]),
        Err(e) => warn!("No single model.safetensors ({}), trying sharded weights", e),
    }

    let json_file = api
        .get("model.safetensors.index.json")
        .context("model has neither model.safetensors nor a shard index")?;
    let json: serde_json::Value = serde_json::from_reader(&std::fs::File::open(&json_file)?)?;
    let weight_map = match json.get("weight_map") {
        Some(serde_json::Value::Object(map)) => map,
        _ => bail!("no weight map in {:?}", json_file),
    };

    let mut safetensors_files = std::collections::BTreeSet::new();
    for value in weight_map.values() {
        if let Some(file) = value.as_str() {
            safetensors_files.insert(file.to_string());
        }
    }

    let safetensors_files = safetensors_files
        .iter()
        .map(|v| api.get(v))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(safetensors_files)
}

/// Load a seq2seq model and its tokenizer from HuggingFace Hub
pub fn load_model(config: &ModelConfig, device: &Device) -> Result<LoadedModel> {
    info!("Loading model: {} ({})", config.model_id, config.revision);

    let api = Api::new()?;
    let repo = api.repo(Repo::with_revision(
        config.model_id.clone(),
        RepoType::Model,
        config.revision.clone(),
    ));

    // Load tokenizer
    info!("Loading tokenizer...");
    let tokenizer_file = repo.get("tokenizer.json")?;
    let mut tokenizer = Tokenizer::from_file(&tokenizer_file)
        .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: config.max_input_tokens,
            ..Default::default()
        }))
        .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;
    tokenizer.with_padding(None);

    // Load config
    info!("Loading model config...");
    let config_file = repo.get("config.json")?;
    let model_config: t5::Config = serde_json::from_slice(&std::fs::read(&config_file)?)
        .with_context(|| format!("{} is not a T5 config", config.model_id))?;

    // Load model weights
    info!("Loading model weights...");
    let filenames = load_safetensors(&repo)?;
    info!("Loading {} safetensor file(s)", filenames.len());

    let vb = unsafe { VarBuilder::from_mmaped_safetensors(&filenames, config.dtype, device)? };
    let model = T5ForConditionalGeneration::load(vb, &model_config)
        .map_err(|e| anyhow!("Failed to load model: {}", e))?;

    info!("Model loaded successfully!");
    info!("  - Vocab size: {}", model_config.vocab_size);
    info!("  - Hidden size: {}", model_config.d_model);
    info!("  - Encoder layers: {}", model_config.num_layers);
    info!(
        "  - Decoder layers: {}",
        model_config.num_decoder_layers.unwrap_or(model_config.num_layers)
    );
    info!("  - Heads: {}", model_config.num_heads);

    Ok(LoadedModel {
        model,
        tokenizer,
        config: model_config,
        device: device.clone(),
        dtype: config.dtype,
    })
}

/// Create a logits processor from the sampling configuration
pub fn create_logits_processor(seed: u64, config: &SamplingConfig) -> LogitsProcessor {
    let sampling = if !config.do_sample || config.temperature <= 0. {
        Sampling::ArgMax
    } else if config.top_p >= 1.0 {
        Sampling::All {
            temperature: config.temperature,
        }
    } else {
        Sampling::TopP {
            p: config.top_p,
            temperature: config.temperature,
        }
    };
    LogitsProcessor::from_sampling(seed, sampling)
}

/// Mask a token out of a logits vector so it can never be sampled
pub fn suppress_token(logits: &Tensor, token_id: u32) -> Result<Tensor> {
    let mut values = logits.to_dtype(DType::F32)?.to_vec1::<f32>()?;
    if let Some(value) = values.get_mut(token_id as usize) {
        *value = f32::NEG_INFINITY;
    }
    Ok(Tensor::from_vec(values, logits.dims(), logits.device())?)
}
