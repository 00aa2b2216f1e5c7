//! Model runtime - owns the loaded seq2seq model and runs generation
//!
//! The runtime is built once at startup and shared by every request handler.
//! Decoding mutates the model's KV cache, so the model itself sits behind a lock;
//! concurrent generations queue for it rather than interleave.

use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use candle_transformers::models::t5::T5ForConditionalGeneration;
use parking_lot::Mutex;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::model::{create_logits_processor, load_model, suppress_token, LoadedModel, ModelConfig};
use crate::sampling::SamplingConfig;

/// Anything that can turn a prompt into generated text.
///
/// Errors are returned to the caller untouched; deciding what a failure means
/// for the user is the caller's job.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str, config: &SamplingConfig) -> Result<String>;
}

/// Runtime statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuntimeStats {
    pub device: String,
    pub model_id: String,
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub dtype: String,
    pub max_input_tokens: usize,
}

/// Result of a single generation
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Generated tokens, without the decoder start token
    pub tokens: Vec<u32>,
    /// Generated text
    pub text: String,
    /// Number of prompt tokens after truncation
    pub prompt_tokens: usize,
    /// Number of generated tokens
    pub generated_tokens: usize,
    /// Tokens per second
    pub tokens_per_second: f64,
    /// Finish reason
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FinishReason {
    /// Hit max_new_tokens
    Length,
    /// Model emitted EOS
    Stop,
}

/// Loaded tokenizer and model, shared read-only across requests
pub struct ModelRuntime {
    device: Device,
    tokenizer: Tokenizer,
    model: Mutex<T5ForConditionalGeneration>,
    stats: RuntimeStats,
    decoder_start_token_id: u32,
    eos_token_id: u32,
    use_cache: bool,
}

impl ModelRuntime {
    /// Download and load the model. Fails if any artifact cannot be loaded.
    pub fn load(config: ModelConfig, device: Device) -> Result<Self> {
        info!("Initializing model runtime...");
        let loaded = load_model(&config, &device)?;
        Ok(Self::from_loaded(&config, loaded))
    }

    /// Wrap an already loaded model
    pub fn from_loaded(config: &ModelConfig, loaded: LoadedModel) -> Self {
        let stats = RuntimeStats {
            device: format!("{:?}", loaded.device),
            model_id: config.model_id.clone(),
            vocab_size: loaded.vocab_size(),
            hidden_size: loaded.hidden_size(),
            num_layers: loaded.num_layers(),
            dtype: format!("{:?}", loaded.dtype),
            max_input_tokens: config.max_input_tokens,
        };
        let decoder_start_token_id = loaded.decoder_start_token_id();
        let eos_token_id = loaded.eos_token_id();

        let LoadedModel {
            model,
            tokenizer,
            config: model_config,
            device,
            ..
        } = loaded;

        Self {
            device,
            tokenizer,
            model: Mutex::new(model),
            stats,
            decoder_start_token_id,
            eos_token_id,
            use_cache: model_config.use_cache,
        }
    }

    /// Encode a prompt to tokens
    pub fn encode(&self, prompt: &str) -> Result<Vec<u32>> {
        self.tokenizer
            .encode(prompt, true)
            .map_err(|e| anyhow!("Tokenization error: {}", e))
            .map(|enc| enc.get_ids().to_vec())
    }

    /// Decode tokens to text
    pub fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Decode error: {}", e))
    }

    /// Generate a continuation for `prompt`
    ///
    /// Sampled runs draw a fresh seed each call, so identical prompts can
    /// produce different text.
    pub fn generate_text(&self, prompt: &str, config: &SamplingConfig) -> Result<GenerationResult> {
        config.validate()?;

        let prompt_tokens = self.encode(prompt)?;
        let prompt_len = prompt_tokens.len();
        debug!("Prompt encoded to {} tokens", prompt_len);

        let seed = if config.do_sample { rand::random() } else { 0 };
        let mut logits_processor = create_logits_processor(seed, config);

        let start_time = std::time::Instant::now();

        // Hold lock for entire generation
        let mut model = self.model.lock();
        model.clear_kv_cache();

        // ===== ENCODE =====
        let input = Tensor::new(prompt_tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        let encoder_output = model.encode(&input)?;

        // ===== DECODE =====
        // Repetition penalty sees the start token too, matching HF's decoder input ids
        let mut tokens = vec![self.decoder_start_token_id];
        let mut finish_reason = FinishReason::Length;

        while tokens.len() - 1 < config.max_new_tokens {
            let ctxt = if tokens.len() == 1 || !self.use_cache {
                &tokens[..]
            } else {
                &tokens[tokens.len() - 1..]
            };
            let decoder_input = Tensor::new(ctxt, &self.device)?.unsqueeze(0)?;
            let mut logits = model.decode(&decoder_input, &encoder_output)?.squeeze(0)?;

            if config.repetition_penalty != 1.0 {
                logits = candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    config.repetition_penalty,
                    &tokens,
                )?;
            }

            if tokens.len() - 1 < config.min_new_tokens {
                logits = suppress_token(&logits, self.eos_token_id)?;
            }

            let next_token = logits_processor.sample(&logits)?;
            if next_token == self.eos_token_id {
                finish_reason = FinishReason::Stop;
                break;
            }
            tokens.push(next_token);
        }

        model.clear_kv_cache();
        drop(model);

        let generated_tokens = tokens.split_off(1);
        let gen_count = generated_tokens.len();
        let text = self.decode(&generated_tokens)?;
        let tokens_per_second = gen_count as f64 / start_time.elapsed().as_secs_f64();

        info!(
            "Generated {} tokens at {:.2} tok/s ({:?})",
            gen_count, tokens_per_second, finish_reason
        );

        Ok(GenerationResult {
            tokens: generated_tokens,
            text,
            prompt_tokens: prompt_len,
            generated_tokens: gen_count,
            tokens_per_second,
            finish_reason,
        })
    }

    /// Get runtime statistics
    pub fn stats(&self) -> RuntimeStats {
        self.stats.clone()
    }
}

impl TextGenerator for ModelRuntime {
    fn generate(&self, prompt: &str, config: &SamplingConfig) -> Result<String> {
        self.generate_text(prompt, config).map(|result| result.text)
    }
}
