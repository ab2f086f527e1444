//! Retrieval domain types: corpus documents and ranked passages.
//!
//! Passages are produced fresh per query and are never cached by the
//! engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordinal trust classification of a source. `A` is the most authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AuthorityLevel {
    A,
    B,
    C,
    #[default]
    D,
}

impl AuthorityLevel {
    /// Additive ranking bonus used by the context assembler.
    pub fn bonus(&self) -> f32 {
        match self {
            AuthorityLevel::A => 0.3,
            AuthorityLevel::B => 0.2,
            AuthorityLevel::C => 0.1,
            AuthorityLevel::D => 0.0,
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            AuthorityLevel::A => "A",
            AuthorityLevel::B => "B",
            AuthorityLevel::C => "C",
            AuthorityLevel::D => "D",
        }
    }
}

impl fmt::Display for AuthorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// Where a passage comes from in the curriculum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// The literary work or textbook the passage belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work: Option<String>,

    /// Slash-separated thematic path, e.g. `poesie/romantisme`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thematic_path: Option<String>,
}

/// Optional caller hint used to rerank fused results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thematic_path: Option<String>,
}

impl ContextHint {
    pub fn is_empty(&self) -> bool {
        self.work.is_none() && self.thematic_path.is_none()
    }
}

/// A corpus document as indexed by the retrieval layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Short summary shown in listings
    #[serde(default)]
    pub excerpt: String,

    /// Full text
    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub authority: AuthorityLevel,

    #[serde(default)]
    pub metadata: SourceMetadata,

    /// Optional embedding vector for the in-memory vector index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    /// Turn this document into a scored passage.
    pub fn to_chunk(&self, score: f32) -> RetrievalChunk {
        RetrievalChunk {
            document_id: self.id.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            score,
            authority: self.authority,
            metadata: self.metadata.clone(),
        }
    }
}

/// A ranked grounding passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalChunk {
    /// Source document identifier
    pub document_id: String,

    pub title: String,

    /// The passage text
    pub content: String,

    /// Relevance score (set by search operations)
    #[serde(default)]
    pub score: f32,

    #[serde(default)]
    pub authority: AuthorityLevel,

    #[serde(default)]
    pub metadata: SourceMetadata,
}

impl RetrievalChunk {
    /// Score used by the context assembler: relevance plus authority bonus.
    pub fn weighted_score(&self) -> f32 {
        self.score + self.authority.bonus()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_bonus_is_ordinal() {
        assert!(AuthorityLevel::A.bonus() > AuthorityLevel::B.bonus());
        assert!(AuthorityLevel::B.bonus() > AuthorityLevel::C.bonus());
        assert!(AuthorityLevel::C.bonus() > AuthorityLevel::D.bonus());
        assert_eq!(AuthorityLevel::D.bonus(), 0.0);
    }

    #[test]
    fn document_defaults_when_fields_missing() {
        let json = r#"{"id":"doc-1","title":"Les Fleurs du mal"}"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.authority, AuthorityLevel::D);
        assert!(doc.tags.is_empty());
        assert!(doc.embedding.is_none());
        assert!(doc.metadata.work.is_none());
    }

    #[test]
    fn weighted_score_adds_bonus() {
        let doc = Document {
            id: "d".into(),
            title: "t".into(),
            tags: vec![],
            excerpt: String::new(),
            content: "c".into(),
            authority: AuthorityLevel::A,
            metadata: SourceMetadata::default(),
            embedding: None,
        };
        let chunk = doc.to_chunk(0.5);
        assert!((chunk.weighted_score() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn empty_hint() {
        assert!(ContextHint::default().is_empty());
        let hint = ContextHint {
            work: Some("Candide".into()),
            thematic_path: None,
        };
        assert!(!hint.is_empty());
    }
}
