//! Decoding hyperparameters shared by every generation call

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// How the decoder picks tokens from the model's output distribution.
///
/// One value is built at startup and handed to every request unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Upper bound on generated tokens
    pub max_new_tokens: usize,
    /// EOS is suppressed until this many tokens have been generated
    pub min_new_tokens: usize,
    /// Softmax temperature, lower is more deterministic
    pub temperature: f64,
    /// Nucleus sampling cutoff
    pub top_p: f64,
    /// Penalty for tokens already generated (1.0 = no penalty)
    pub repetition_penalty: f32,
    /// Sample from the distribution instead of taking the argmax
    pub do_sample: bool,
}

impl SamplingConfig {
    /// The configuration the explainer is deployed with.
    pub const fn finance_default() -> Self {
        Self {
            max_new_tokens: 250,
            min_new_tokens: 25,
            temperature: 0.6,
            top_p: 0.9,
            repetition_penalty: 1.2,
            do_sample: true,
        }
    }

    /// Greedy decoding with the same token bounds.
    pub fn greedy(self) -> Self {
        Self {
            do_sample: false,
            ..self
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_new_tokens == 0 {
            bail!("max_new_tokens must be at least 1");
        }
        if self.min_new_tokens > self.max_new_tokens {
            bail!(
                "min_new_tokens ({}) exceeds max_new_tokens ({})",
                self.min_new_tokens,
                self.max_new_tokens
            );
        }
        if self.do_sample {
            if !(self.temperature > 0.0) {
                bail!("temperature must be positive, got {}", self.temperature);
            }
            if !(self.top_p > 0.0 && self.top_p <= 1.0) {
                bail!("top_p must be in (0, 1], got {}", self.top_p);
            }
        }
        if !(self.repetition_penalty > 0.0) {
            bail!(
                "repetition_penalty must be positive, got {}",
                self.repetition_penalty
            );
        }
        Ok(())
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self::finance_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finance_defaults() {
        let config = SamplingConfig::default();

        assert_eq!(config.max_new_tokens, 250);
        assert_eq!(config.min_new_tokens, 25);
        assert_eq!(config.temperature, 0.6);
        assert_eq!(config.top_p, 0.9);
        assert_eq!(config.repetition_penalty, 1.2);
        assert!(config.do_sample);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_greedy_keeps_bounds() {
        let config = SamplingConfig::finance_default().greedy();

        assert!(!config.do_sample);
        assert_eq!(config.max_new_tokens, 250);
        assert_eq!(config.min_new_tokens, 25);
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let config = SamplingConfig {
            min_new_tokens: 300,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds max_new_tokens"));
    }

    #[test]
    fn test_validate_rejects_bad_sampling_values() {
        let zero_temp = SamplingConfig {
            temperature: 0.0,
            ..Default::default()
        };
        assert!(zero_temp.validate().is_err());

        let wide_top_p = SamplingConfig {
            top_p: 1.5,
            ..Default::default()
        };
        assert!(wide_top_p.validate().is_err());

        // Temperature is irrelevant for greedy decoding
        assert!(zero_temp.greedy().validate().is_ok());
    }
}
