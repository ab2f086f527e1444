//! Hybrid retrieval: lexical + best-effort vector, fused with RRF, then
//! reranked by metadata affinity.

use crate::fusion::{DEFAULT_RRF_K, reciprocal_rank_fusion};
use crate::lexical::{LexicalIndex, LexicalSearch};
use crate::rerank::rerank_by_metadata;
use crate::vector::{InMemoryVectorIndex, VectorOutcome, VectorSearch};
use std::sync::Arc;
use std::time::Duration;
use tierwise_core::error::RetrievalError;
use tierwise_core::provider::Provider;
use tierwise_core::retrieval::{ContextHint, Document, RetrievalChunk};
use tracing::{debug, warn};

/// Tuning knobs for [`HybridRetriever`].
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub rrf_k: u32,
    /// Depth of each candidate list before fusion.
    pub candidate_pool: usize,
    pub vector_timeout: Duration,
    /// Multiplicative boost for passages matching the caller's hint.
    pub metadata_boost: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            candidate_pool: 20,
            vector_timeout: Duration::from_millis(1500),
            metadata_boost: 1.5,
        }
    }
}

impl From<&tierwise_config::RetrievalConfig> for RetrievalSettings {
    fn from(config: &tierwise_config::RetrievalConfig) -> Self {
        Self {
            rrf_k: config.rrf_k,
            candidate_pool: config.candidate_pool,
            vector_timeout: Duration::from_millis(config.vector_timeout_ms),
            metadata_boost: config.metadata_boost,
        }
    }
}

/// Which sources contributed to a result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    Hybrid,
    LexicalOnly,
}

pub struct HybridRetriever {
    lexical: Arc<dyn LexicalSearch>,
    vector: Option<Arc<dyn VectorSearch>>,
    settings: RetrievalSettings,
}

impl HybridRetriever {
    pub fn new(
        lexical: Arc<dyn LexicalSearch>,
        vector: Option<Arc<dyn VectorSearch>>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            lexical,
            vector,
            settings,
        }
    }

    /// Index `documents` lexically and, when an embedder is given and some
    /// documents carry embeddings, in a vector index as well.
    pub fn from_documents(
        documents: Vec<Document>,
        embedder: Option<(Arc<dyn Provider>, String)>,
        settings: RetrievalSettings,
    ) -> Result<Self, RetrievalError> {
        let vector = embedder.and_then(|(provider, model)| {
            let index = InMemoryVectorIndex::new(&documents, provider, model);
            (!index.is_empty()).then(|| Arc::new(index) as Arc<dyn VectorSearch>)
        });
        let lexical = LexicalIndex::build(documents)?;
        debug!(
            documents = lexical.len(),
            vector = vector.is_some(),
            "Retrieval indexes built"
        );
        Ok(Self::new(Arc::new(lexical), vector, settings))
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Ranked passages for `query`, at most `max_results`.
    ///
    /// Only lexical failures propagate. Vector failures and timeouts degrade
    /// to lexical-only results.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        hint: Option<&ContextHint>,
    ) -> Result<Vec<RetrievalChunk>, RetrievalError> {
        self.search_with_mode(query, max_results, hint)
            .await
            .map(|(chunks, _)| chunks)
    }

    /// Like [`search`](Self::search), also reporting whether vector
    /// candidates took part.
    pub async fn search_with_mode(
        &self,
        query: &str,
        max_results: usize,
        hint: Option<&ContextHint>,
    ) -> Result<(Vec<RetrievalChunk>, RetrievalMode), RetrievalError> {
        let pool = self.settings.candidate_pool;
        let lexical = self.lexical.search(query, pool)?;

        let vector_hits = match self.vector_candidates(query, pool).await {
            VectorOutcome::Hits(hits) => hits,
            VectorOutcome::Unavailable { reason } => {
                if self.vector.is_some() {
                    warn!(reason = %reason, "Vector search unavailable, using lexical results only");
                }
                Vec::new()
            }
        };

        let (mut fused, mode) = if vector_hits.is_empty() {
            (lexical, RetrievalMode::LexicalOnly)
        } else {
            (
                reciprocal_rank_fusion(&lexical, &vector_hits, self.settings.rrf_k),
                RetrievalMode::Hybrid,
            )
        };

        if let Some(hint) = hint {
            rerank_by_metadata(&mut fused, hint, self.settings.metadata_boost);
        }
        fused.truncate(max_results);

        debug!(
            query_len = query.len(),
            results = fused.len(),
            mode = ?mode,
            "Hybrid search complete"
        );
        Ok((fused, mode))
    }

    async fn vector_candidates(&self, query: &str, pool: usize) -> VectorOutcome {
        let Some(vector) = &self.vector else {
            return VectorOutcome::unavailable("no vector backend configured");
        };
        if query.trim().is_empty() {
            return VectorOutcome::Hits(Vec::new());
        }

        match tokio::time::timeout(self.settings.vector_timeout, vector.nearest(query, pool)).await {
            Ok(outcome) => outcome,
            Err(_) => VectorOutcome::unavailable(format!(
                "{} timed out after {}ms",
                vector.name(),
                self.settings.vector_timeout.as_millis()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tierwise_core::retrieval::{AuthorityLevel, SourceMetadata};

    fn doc(id: &str, title: &str, work: Option<&str>) -> Document {
        Document {
            id: id.into(),
            title: title.into(),
            tags: vec![],
            excerpt: String::new(),
            content: format!("{title} content"),
            authority: AuthorityLevel::B,
            metadata: SourceMetadata {
                work: work.map(String::from),
                thematic_path: None,
            },
            embedding: None,
        }
    }

    fn lexical() -> Arc<dyn LexicalSearch> {
        Arc::new(
            LexicalIndex::build(vec![
                doc("l1", "Le romantisme", Some("Hernani")),
                doc("l2", "Romantisme et nature", Some("Les Contemplations")),
                doc("l3", "Romantisme noir", None),
            ])
            .unwrap(),
        )
    }

    fn chunk(id: &str) -> RetrievalChunk {
        doc(id, id, None).to_chunk(0.9)
    }

    enum Behaviour {
        Hits(Vec<&'static str>),
        Down,
        Hang,
    }

    struct MockVector {
        behaviour: Behaviour,
        calls: Mutex<u32>,
    }

    impl MockVector {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl VectorSearch for MockVector {
        fn name(&self) -> &str {
            "mock"
        }

        async fn nearest(&self, _query: &str, limit: usize) -> VectorOutcome {
            *self.calls.lock().unwrap() += 1;
            match &self.behaviour {
                Behaviour::Hits(ids) => {
                    VectorOutcome::Hits(ids.iter().take(limit).map(|id| chunk(id)).collect())
                }
                Behaviour::Down => VectorOutcome::unavailable("connection refused"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    VectorOutcome::Hits(vec![])
                }
            }
        }
    }

    fn retriever(vector: Option<Arc<MockVector>>) -> HybridRetriever {
        let settings = RetrievalSettings {
            vector_timeout: Duration::from_millis(50),
            ..RetrievalSettings::default()
        };
        HybridRetriever::new(
            lexical(),
            vector.map(|v| v as Arc<dyn VectorSearch>),
            settings,
        )
    }

    #[tokio::test]
    async fn lexical_only_passthrough_keeps_scores() {
        let r = retriever(None);
        let (hits, mode) = r.search_with_mode("romantisme", 10, None).await.unwrap();
        assert_eq!(mode, RetrievalMode::LexicalOnly);
        assert_eq!(hits.len(), 3);
        // Raw lexical scores, not RRF scores
        assert!(hits.iter().all(|h| h.score >= 0.4));
    }

    #[tokio::test]
    async fn empty_and_unmatched_queries_do_not_fail() {
        let r = retriever(Some(MockVector::new(Behaviour::Hits(vec![]))));
        assert!(r.search("", 5, None).await.unwrap().is_empty());
        assert!(r.search("thermodynamique", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hybrid_fuses_both_lists() {
        let vector = MockVector::new(Behaviour::Hits(vec!["l3", "v1"]));
        let r = retriever(Some(vector.clone()));
        let (hits, mode) = r.search_with_mode("romantisme", 10, None).await.unwrap();
        assert_eq!(mode, RetrievalMode::Hybrid);
        assert_eq!(*vector.calls.lock().unwrap(), 1);
        // l3 appears in both lists
        assert_eq!(hits[0].document_id, "l3");
        assert!(hits.iter().any(|h| h.document_id == "v1"));
        assert_eq!(hits.len(), 4);
    }

    #[tokio::test]
    async fn vector_outage_degrades_to_lexical() {
        let r = retriever(Some(MockVector::new(Behaviour::Down)));
        let (hits, mode) = r.search_with_mode("romantisme", 10, None).await.unwrap();
        assert_eq!(mode, RetrievalMode::LexicalOnly);
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn vector_timeout_degrades_to_lexical() {
        let r = retriever(Some(MockVector::new(Behaviour::Hang)));
        let (hits, mode) = r.search_with_mode("romantisme", 10, None).await.unwrap();
        assert_eq!(mode, RetrievalMode::LexicalOnly);
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn hint_reranks_results() {
        let r = retriever(None);
        let hint = ContextHint {
            work: Some("les contemplations".into()),
            thematic_path: None,
        };
        let plain = r.search("romantisme", 10, None).await.unwrap();
        let hinted = r.search("romantisme", 10, Some(&hint)).await.unwrap();
        assert_ne!(plain[0].document_id, "l2");
        assert_eq!(hinted[0].document_id, "l2");
    }

    #[tokio::test]
    async fn results_are_truncated() {
        let r = retriever(Some(MockVector::new(Behaviour::Hits(vec!["v1", "v2"]))));
        assert_eq!(r.search("romantisme", 2, None).await.unwrap().len(), 2);
        assert!(r.search("romantisme", 0, None).await.unwrap().is_empty());
    }

    #[test]
    fn from_documents_rejects_duplicates() {
        let result = HybridRetriever::from_documents(
            vec![doc("x", "a", None), doc("x", "b", None)],
            None,
            RetrievalSettings::default(),
        );
        assert!(matches!(result, Err(RetrievalError::MalformedIndex(_))));
    }
}
