//! The generation engine: the heart of Tierwise.
//!
//! A request flows through four stages:
//!
//! 1. **Retrieve** ranked passages for the request's query (optional)
//! 2. **Route** to a tier sized for the estimated context
//! 3. **Assemble** a prompt that fits the tier's budget
//! 4. **Generate**, falling back down the cascade on failure
//!
//! Breaker state is updated after every attempt so that repeated failures
//! steer later requests away from an unhealthy tier.

pub mod context;
pub mod pipeline;

pub use context::{
    AssembledContext, AssemblyInput, AssemblyMetadata, ContextAssembler, DropInfo, LayerStats,
    build_context,
};
pub use pipeline::{
    AttemptRecord, GenerationOutcome, GenerationPipeline, GenerationRequest, PipelineSettings,
    PreparedGeneration, StreamingGeneration, estimate_request_tokens,
};

use std::path::Path;
use tierwise_core::error::Result;
use tierwise_retrieval::{HybridRetriever, RetrievalSettings, load_corpus};
use tracing::info;

/// Load the configured corpus and index it.
///
/// Returns `None` when no corpus is configured. Query embeddings use the
/// remote endpoint when a credential is present; otherwise retrieval is
/// lexical only.
pub fn build_retriever(config: &tierwise_config::AppConfig) -> Result<Option<HybridRetriever>> {
    let Some(path) = config.retrieval.corpus_path.as_deref() else {
        return Ok(None);
    };
    let documents = load_corpus(Path::new(path))?;
    let count = documents.len();
    let embedder = tierwise_providers::build_remote_provider(config)
        .map(|provider| (provider, config.endpoints.embedding_model.clone()));

    let retriever = HybridRetriever::from_documents(
        documents,
        embedder,
        RetrievalSettings::from(&config.retrieval),
    )?;
    info!(path, documents = count, "Corpus indexed");
    Ok(Some(retriever))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn no_corpus_means_no_retriever() {
        let config = tierwise_config::AppConfig::default();
        assert!(build_retriever(&config).unwrap().is_none());
    }

    #[test]
    fn corpus_file_is_indexed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "d1", "title": "Le Cid", "content": "Corneille, tragi-comédie.", "authority": "A"}}]"#
        )
        .unwrap();

        let mut config = tierwise_config::AppConfig::default();
        config.retrieval.corpus_path = Some(file.path().display().to_string());
        assert!(build_retriever(&config).unwrap().is_some());
    }

    #[test]
    fn missing_corpus_is_an_error() {
        let mut config = tierwise_config::AppConfig::default();
        config.retrieval.corpus_path = Some("/nonexistent/corpus.json".into());
        assert!(build_retriever(&config).is_err());
    }
}
