//! Example: Ask the explainer one question from the command line
//!
//! Run with:
//!   cargo run --example ask -- --question "What is compound interest?"
//!   cargo run --example ask -- --model google/flan-t5-small --question "What is a bond?"
//!   cargo run --example ask -- --greedy --question "What is inflation?"

use anyhow::Result;
use finexplain_core::{ask, select_device, ModelConfig, ModelRuntime, Question, SamplingConfig};

fn main() -> Result<()> {
    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let question = args
        .iter()
        .position(|a| a == "--question")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("What is compound interest?");

    let model_id = args
        .iter()
        .position(|a| a == "--model")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("google/flan-t5-large");

    let greedy = args.iter().any(|a| a == "--greedy");
    let force_cpu = args.iter().any(|a| a == "--cpu");

    println!("Finexplain - finance concept explainer");
    println!("Model: {}", model_id);
    println!("Question: {}", question);
    println!();

    println!("Loading model...");
    let device = select_device(force_cpu)?;
    let runtime = ModelRuntime::load(ModelConfig::with_model_id(model_id), device)?;

    let stats = runtime.stats();
    println!("Model loaded!");
    println!("  Device: {}", stats.device);
    println!("  Vocab size: {}", stats.vocab_size);
    println!("  Hidden size: {}", stats.hidden_size);
    println!("  Layers: {}", stats.num_layers);
    println!();

    let config = if greedy {
        SamplingConfig::default().greedy()
    } else {
        SamplingConfig::default()
    };

    let start = std::time::Instant::now();
    let answer = ask(&runtime, &config, &Question::new(question));

    println!("---");
    println!("{}", answer.answer);
    println!("---");
    println!();
    println!("Answered in {:.2}s", start.elapsed().as_secs_f64());

    Ok(())
}
