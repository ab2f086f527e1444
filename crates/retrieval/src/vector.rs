//! Vector similarity search.
//!
//! The backend is best-effort: any failure is reported as
//! [`VectorOutcome::Unavailable`] and the fuser degrades to lexical-only.

use async_trait::async_trait;
use std::sync::Arc;
use tierwise_core::provider::{EmbeddingRequest, Provider};
use tierwise_core::retrieval::{Document, RetrievalChunk};
use tracing::debug;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Map a non-negative distance onto a similarity in `(0, 1]`.
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Result of a best-effort vector query.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorOutcome {
    Hits(Vec<RetrievalChunk>),
    Unavailable { reason: String },
}

impl VectorOutcome {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        VectorOutcome::Unavailable {
            reason: reason.into(),
        }
    }

    /// Hits, or an empty list when the backend was unavailable.
    pub fn into_hits(self) -> Vec<RetrievalChunk> {
        match self {
            VectorOutcome::Hits(hits) => hits,
            VectorOutcome::Unavailable { .. } => Vec::new(),
        }
    }
}

/// A nearest-neighbour candidate source.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    fn name(&self) -> &str;

    /// Nearest candidates, most similar first, at most `limit`.
    async fn nearest(&self, query: &str, limit: usize) -> VectorOutcome;
}

/// Brute-force index over documents that carry an embedding.
///
/// Query embeddings come from an embedding-capable [`Provider`].
pub struct InMemoryVectorIndex {
    docs: Vec<Document>,
    embedder: Arc<dyn Provider>,
    model: String,
}

impl InMemoryVectorIndex {
    /// Keep only documents with a non-empty embedding.
    pub fn new(documents: &[Document], embedder: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        let docs = documents
            .iter()
            .filter(|d| d.embedding.as_ref().is_some_and(|e| !e.is_empty()))
            .cloned()
            .collect();
        Self {
            docs,
            embedder,
            model: model.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Rank indexed documents against a query embedding.
    pub fn rank(&self, query_embedding: &[f32], limit: usize) -> Vec<RetrievalChunk> {
        let mut scored: Vec<RetrievalChunk> = self
            .docs
            .iter()
            .filter_map(|doc| {
                let emb = doc.embedding.as_ref()?;
                if emb.len() != query_embedding.len() {
                    return None;
                }
                let distance = 1.0 - cosine_similarity(emb, query_embedding);
                Some(doc.to_chunk(distance_to_similarity(distance)))
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

#[async_trait]
impl VectorSearch for InMemoryVectorIndex {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn nearest(&self, query: &str, limit: usize) -> VectorOutcome {
        if self.docs.is_empty() {
            return VectorOutcome::unavailable("no embedded documents");
        }

        let request = EmbeddingRequest {
            model: self.model.clone(),
            inputs: vec![query.to_string()],
        };
        let response = match self.embedder.embed(request).await {
            Ok(r) => r,
            Err(e) => return VectorOutcome::unavailable(format!("embedding failed: {e}")),
        };
        let Some(query_embedding) = response.embeddings.into_iter().next() else {
            return VectorOutcome::unavailable("embedding response was empty");
        };

        let hits = self.rank(&query_embedding, limit);
        debug!(count = hits.len(), "Vector search complete");
        VectorOutcome::Hits(hits)
    }
}
