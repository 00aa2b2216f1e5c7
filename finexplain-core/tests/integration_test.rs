use anyhow::{anyhow, bail, Result};
use finexplain_core::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Stub that records what it was asked and replies with fixed text
struct FixedGenerator {
    reply: String,
    calls: Mutex<Vec<(String, SamplingConfig)>>,
}

impl FixedGenerator {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl TextGenerator for FixedGenerator {
    fn generate(&self, prompt: &str, config: &SamplingConfig) -> Result<String> {
        self.calls.lock().push((prompt.to_string(), *config));
        Ok(self.reply.clone())
    }
}

/// Stub that always fails and counts attempts
struct FailingGenerator {
    attempts: AtomicUsize,
}

impl TextGenerator for FailingGenerator {
    fn generate(&self, _prompt: &str, _config: &SamplingConfig) -> Result<String> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        bail!("oom")
    }
}

/// Stub whose output differs per call, standing in for a sampled model
struct CountingGenerator {
    counter: AtomicUsize,
}

impl TextGenerator for CountingGenerator {
    fn generate(&self, _prompt: &str, _config: &SamplingConfig) -> Result<String> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("explanation #{n}"))
    }
}

#[test]
fn test_compound_interest_scenario() {
    let generator = FixedGenerator::new("Compound interest is interest on interest.");
    let question: Question =
        serde_json::from_str(r#"{"user_q": "What is compound interest?"}"#).unwrap();

    let answer = ask(&generator, &SamplingConfig::default(), &question);

    assert_eq!(
        serde_json::to_value(&answer).unwrap(),
        serde_json::json!({ "answer": "Compound interest is interest on interest." })
    );
}

#[test]
fn test_failure_scenario() {
    let generator = FailingGenerator {
        attempts: AtomicUsize::new(0),
    };
    let answer = ask(&generator, &SamplingConfig::default(), &Question::new("X"));

    assert_eq!(
        serde_json::to_value(&answer).unwrap(),
        serde_json::json!({ "answer": "Something went wrong: oom" })
    );
    // No retries
    assert_eq!(generator.attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failure_shape_is_stable_across_calls() {
    let generator = FailingGenerator {
        attempts: AtomicUsize::new(0),
    };
    let config = SamplingConfig::default();

    for _ in 0..10 {
        let answer = ask(&generator, &config, &Question::new("What is a hedge fund?"));
        assert!(answer.answer.starts_with(ERROR_MARKER));
        assert_eq!(answer.answer, "Something went wrong: oom");
    }
    assert_eq!(generator.attempts.load(Ordering::SeqCst), 10);
}

#[test]
fn test_generator_receives_exact_prompt_and_fixed_config() {
    let generator = FixedGenerator::new("text");
    let config = SamplingConfig::default();
    let user_q = "What is a put option?\nAnd a call?";

    ask(&generator, &config, &Question::new(user_q));

    let calls = generator.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].0,
        format!(
            "Explain the following finance concept in a detailed and informative way:\n\n{}",
            user_q
        )
    );
    assert_eq!(calls[0].1, SamplingConfig::finance_default());
}

#[test]
fn test_long_question_is_not_truncated() {
    let generator = FixedGenerator::new("text");
    let user_q = "diversification ".repeat(2_000);

    ask(&generator, &SamplingConfig::default(), &Question::new(user_q.clone()));

    let calls = generator.calls.lock();
    assert!(calls[0].0.ends_with(&user_q));
    assert_eq!(calls[0].0.len(), PROMPT_PREFIX.len() + user_q.len());
}

#[test]
fn test_non_empty_question_gives_non_empty_answer() {
    let ok = FixedGenerator::new(" A stock is a share of a company. ");
    let failing = FailingGenerator {
        attempts: AtomicUsize::new(0),
    };

    for user_q in ["stock", "What is EBITDA?", "€ and ¥ exchange rates"] {
        assert!(!ask(&ok, &SamplingConfig::default(), &Question::new(user_q)).answer.is_empty());
        assert!(!ask(&failing, &SamplingConfig::default(), &Question::new(user_q)).answer.is_empty());
    }
}

#[test]
fn test_shared_generator_across_threads() {
    let generator: Arc<dyn TextGenerator> = Arc::new(CountingGenerator {
        counter: AtomicUsize::new(0),
    });
    let config = SamplingConfig::default();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let generator = Arc::clone(&generator);
            std::thread::spawn(move || {
                ask(&*generator, &config, &Question::new(format!("question {i}")))
            })
        })
        .collect();

    let mut answers: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().answer)
        .collect();
    answers.sort();
    answers.dedup();

    // One answer per question, none lost
    assert_eq!(answers.len(), 8);
    assert!(answers.iter().all(|a| a.starts_with("explanation #")));
}

#[test]
fn test_error_chain_is_reported() {
    struct ContextGenerator;

    impl TextGenerator for ContextGenerator {
        fn generate(&self, _prompt: &str, _config: &SamplingConfig) -> Result<String> {
            Err(anyhow!("invalid UTF-8 in token stream").context("Decode error"))
        }
    }

    let answer = ask(&ContextGenerator, &SamplingConfig::default(), &Question::new("X"));

    assert!(answer.is_failure());
    assert!(answer.answer.contains("Decode error"));
    assert!(answer.answer.contains("invalid UTF-8 in token stream"));
}

#[test]
fn test_sampling_config_defaults() {
    let config = SamplingConfig::default();

    assert_eq!(config.max_new_tokens, 250);
    assert_eq!(config.min_new_tokens, 25);
    assert_eq!(config.temperature, 0.6);
    assert_eq!(config.top_p, 0.9);
    assert_eq!(config.repetition_penalty, 1.2);
    assert!(config.do_sample);
}

#[test]
fn test_model_config_presets() {
    assert_eq!(ModelConfig::default().model_id, "google/flan-t5-large");
    assert_eq!(ModelConfig::flan_t5_small().model_id, "google/flan-t5-small");
    assert_eq!(ModelConfig::with_model_id("my/t5").revision, "main");
}
