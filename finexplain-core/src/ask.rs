//! Question answering pipeline
//!
//! Turns a [`Question`] into an [`Answer`]: build the prompt, run the generator,
//! and fold any failure into the answer text. Callers always get an `Answer`.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::{debug, info, warn};

use crate::engine::TextGenerator;
use crate::sampling::SamplingConfig;

/// Instruction placed in front of every question. Changing it changes what the model writes.
pub const PROMPT_PREFIX: &str =
    "Explain the following finance concept in a detailed and informative way:\n\n";

/// Prefix of every answer that reports a failure instead of an explanation
pub const ERROR_MARKER: &str = "Something went wrong: ";

/// Incoming request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub user_q: String,
}

impl Question {
    pub fn new(user_q: impl Into<String>) -> Self {
        Self {
            user_q: user_q.into(),
        }
    }
}

/// Outgoing response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
}

impl Answer {
    /// Wrap generated text, dropping surrounding whitespace
    pub fn explanation(text: &str) -> Self {
        Self {
            answer: text.trim().to_string(),
        }
    }

    /// Report a failure in-band
    pub fn failure(err: impl Display) -> Self {
        Self {
            answer: format!("{ERROR_MARKER}{err:#}"),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.answer.starts_with(ERROR_MARKER)
    }
}

/// Full prompt for a question, with `user_q` inserted verbatim
pub fn build_prompt(user_q: &str) -> String {
    let mut prompt = String::with_capacity(PROMPT_PREFIX.len() + user_q.len());
    prompt.push_str(PROMPT_PREFIX);
    prompt.push_str(user_q);
    prompt
}

/// Answer one question.
///
/// Never fails: generation errors come back as an [`Answer`] starting with
/// [`ERROR_MARKER`]. Nothing is retried.
pub fn ask<G>(generator: &G, config: &SamplingConfig, question: &Question) -> Answer
where
    G: TextGenerator + ?Sized,
{
    let prompt = build_prompt(&question.user_q);
    debug!("Prompt: {:?}", prompt);

    match generator.generate(&prompt, config) {
        Ok(text) => {
            let answer = Answer::explanation(&text);
            info!(
                "Answered question ({} chars) with {} chars",
                question.user_q.len(),
                answer.answer.len()
            );
            answer
        }
        Err(e) => {
            warn!("Generation failed: {:#}", e);
            Answer::failure(e)
        }
    }
}
