//! Finexplain Core - seq2seq inference behind the finance explainer
//!
//! This crate implements:
//! - T5 model and tokenizer loading from HuggingFace Hub via candle-transformers
//! - Sampled or greedy generation with repetition penalty and token bounds
//! - The question -> prompt -> answer pipeline, with failures folded into the answer
//! - Loading of the optional reference dataset

pub mod ask;
pub mod dataset;
pub mod engine;
pub mod model;
pub mod sampling;

pub use ask::{ask, build_prompt, Answer, Question, ERROR_MARKER, PROMPT_PREFIX};
pub use dataset::{Dataset, QaPair, DEFAULT_DATASET_PATH};
pub use engine::{FinishReason, GenerationResult, ModelRuntime, RuntimeStats, TextGenerator};
pub use model::{create_logits_processor, load_model, select_device, LoadedModel, ModelConfig};
pub use sampling::SamplingConfig;
