use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use support_chatbot::synthesizer::NO_CONTEXT_MESSAGE;
use support_chatbot::{ChatbotService, Components, Settings};

#[derive(Parser, Debug)]
#[command(name = "eval")]
#[command(about = "Run a question set against the indexed documents")]
struct Cli {
    #[arg(long, default_value = "eval/prompts.jsonl")]
    file: String,
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct EvalPrompt {
    id: String,
    question: String,
    #[serde(default)]
    expect_contains: Vec<String>,
    #[serde(default)]
    expect_sources: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut settings = Settings::from_env();
    settings.rebuild_index_if_missing = false;
    init_tracing();
    let cli = Cli::parse();

    let prompts = load_prompts(&cli.file)?;
    if prompts.is_empty() {
        anyhow::bail!("no prompts found in {}", cli.file);
    }

    let components = Components::from_settings(&settings);
    let chatbot = ChatbotService::new(settings, components);
    if !chatbot.warm_start().await {
        anyhow::bail!("no usable index found; run the ingest binary first");
    }

    let mut total = 0usize;
    let mut pass_contains = 0usize;
    let mut with_sources = 0usize;
    let mut no_context = 0usize;
    let mut source_expectations = 0usize;
    let mut source_hits = 0usize;

    for prompt in prompts {
        total += 1;
        let answer = chatbot
            .answer(&prompt.question)
            .await
            .with_context(|| format!("failed eval prompt {}", prompt.id))?;

        let answer_lower = answer.response.to_ascii_lowercase();
        if answer.response == NO_CONTEXT_MESSAGE {
            no_context += 1;
        }

        let sources = answer.sources.unwrap_or_default();
        if !sources.is_empty() {
            with_sources += 1;
        }

        if prompt
            .expect_contains
            .iter()
            .all(|needle| answer_lower.contains(&needle.to_ascii_lowercase()))
        {
            pass_contains += 1;
        }

        if !prompt.expect_sources.is_empty() {
            source_expectations += 1;
            if prompt
                .expect_sources
                .iter()
                .all(|expected| sources.iter().any(|source| source == expected))
            {
                source_hits += 1;
            }
        }

        if cli.verbose {
            println!("--- {} ---", prompt.id);
            println!("Q: {}", prompt.question);
            println!("A: {}", answer.response.replace('\n', " "));
            println!("Sources: {}", sources.join(", "));
            println!();
        }
    }

    println!("Eval prompts: {}", total);
    println!("Contains/expected accuracy: {:.1}%", ratio(pass_contains, total) * 100.0);
    println!("Source rate: {:.1}%", ratio(with_sources, total) * 100.0);
    println!("No-context rate: {:.1}%", ratio(no_context, total) * 100.0);
    if source_expectations > 0 {
        println!(
            "Expected-source hit-rate: {:.1}% ({}/{})",
            ratio(source_hits, source_expectations) * 100.0,
            source_hits,
            source_expectations
        );
    }

    Ok(())
}

fn load_prompts(path: &str) -> Result<Vec<EvalPrompt>> {
    let file = File::open(path).with_context(|| format!("failed opening {}", path))?;
    let reader = BufReader::new(file);
    let mut prompts = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parsed: EvalPrompt = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON at {} line {}", path, idx + 1))?;
        prompts.push(parsed);
    }

    Ok(prompts)
}

fn ratio(n: usize, d: usize) -> f32 {
    if d == 0 {
        return 0.0;
    }
    n as f32 / d as f32
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
