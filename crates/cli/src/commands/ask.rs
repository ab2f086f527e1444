//! `tierwise ask`: Run one message through the full pipeline.

use std::io::Write;
use tierwise_config::AppConfig;
use tierwise_engine::{AssemblyMetadata, GenerationPipeline, GenerationRequest};
use tracing::debug;

pub async fn run(
    skill: String,
    message: String,
    query: Option<String>,
    system: String,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let pipeline = GenerationPipeline::from_config(&config)?;

    let mut request = GenerationRequest::new(skill, system, message);
    if let Some(query) = query {
        request = request.with_retrieval(query, None);
    }
    debug!(skill = %request.skill, stream, "Running pipeline from the command line");

    if stream {
        let mut streaming = pipeline.stream(&request).await?;
        eprintln!("  [{} · {}]", streaming.tier, streaming.model);
        while let Some(chunk) = streaming.receiver.recv().await {
            let chunk = chunk?;
            if let Some(text) = chunk.content {
                print!("{text}");
                std::io::stdout().flush()?;
            }
            if chunk.done {
                break;
            }
        }
        println!();
        print_context(&streaming.context);
        return Ok(());
    }

    eprint!("  Thinking...");
    let outcome = pipeline.generate(&request).await?;
    eprint!("\r              \r");

    println!("{}", outcome.response.message.content);
    println!();
    eprintln!("  [{} · {}]", outcome.tier, outcome.model);
    for attempt in &outcome.attempts {
        eprintln!("  ⚠️  {} failed: {}", attempt.tier, attempt.error);
    }
    if let Some(usage) = outcome.response.usage {
        eprintln!(
            "  tokens: {} in / {} out",
            usage.prompt_tokens, usage.completion_tokens
        );
    }
    print_context(&outcome.context);

    Ok(())
}

fn print_context(meta: &AssemblyMetadata) {
    eprintln!(
        "  context: {}/{} tokens ({:.1}%)",
        meta.total_tokens, meta.budget, meta.utilization_pct
    );
    for drop in &meta.drops {
        eprintln!(
            "    dropped {} from {}: {}",
            drop.items_dropped, drop.layer, drop.reason
        );
    }
}
