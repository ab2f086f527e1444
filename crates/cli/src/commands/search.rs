//! `tierwise search`: Query the configured corpus.

use tierwise_config::AppConfig;
use tierwise_core::retrieval::ContextHint;
use tierwise_retrieval::RetrievalMode;

pub async fn run(
    query: String,
    limit: usize,
    work: Option<String>,
    path: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let retriever = tierwise_engine::build_retriever(&config)?
        .ok_or("No corpus configured — set retrieval.corpus_path in config.toml")?;

    let hint = ContextHint {
        work,
        thematic_path: path,
    };
    let (results, mode) = retriever.search_with_mode(&query, limit, Some(&hint)).await?;

    let mode = match mode {
        RetrievalMode::Hybrid => "hybrid",
        RetrievalMode::LexicalOnly => "lexical only",
    };
    println!("  {} result(s) for \"{query}\" ({mode})", results.len());
    println!();
    for (i, chunk) in results.iter().enumerate() {
        println!(
            "  {:>2}. [{}] {}  ({:.4})",
            i + 1,
            chunk.authority.marker(),
            chunk.title,
            chunk.score
        );
        if let Some(work) = &chunk.metadata.work {
            println!("      work: {work}");
        }
        let preview: String = chunk.content.chars().take(120).collect();
        println!("      {preview}");
    }

    Ok(())
}
