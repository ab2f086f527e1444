//! Lexical search over an in-memory corpus.
//!
//! Query and fields are case- and diacritic-folded. A document scores the
//! field weight for every query token found in that field:
//! title ×4, tags ×3, excerpt ×2, content ×1. The raw sum is normalised by
//! the best possible score so results land in `[0, 1]`.

use std::collections::HashSet;
use tierwise_core::error::RetrievalError;
use tierwise_core::retrieval::{Document, RetrievalChunk};

const TITLE_WEIGHT: f32 = 4.0;
const TAGS_WEIGHT: f32 = 3.0;
const EXCERPT_WEIGHT: f32 = 2.0;
const CONTENT_WEIGHT: f32 = 1.0;
const MAX_TOKEN_SCORE: f32 = TITLE_WEIGHT + TAGS_WEIGHT + EXCERPT_WEIGHT + CONTENT_WEIGHT;

/// Short words carrying no retrieval signal, already folded.
const STOP_WORDS: &[&str] = &[
    "au", "aux", "avec", "ce", "ces", "cet", "cette", "dans", "de", "des", "du", "elle", "en",
    "est", "et", "il", "la", "le", "les", "leur", "mais", "ne", "ou", "par", "pas", "pour",
    "qu", "que", "qui", "sa", "se", "ses", "son", "sur", "un", "une", "a", "an", "and", "are",
    "for", "in", "is", "of", "on", "or", "the", "to",
];

/// Lowercase and strip Latin diacritics.
pub fn fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        for lower in c.to_lowercase() {
            match lower {
                'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => out.push('a'),
                'ç' => out.push('c'),
                'è' | 'é' | 'ê' | 'ë' => out.push('e'),
                'ì' | 'í' | 'î' | 'ï' => out.push('i'),
                'ñ' => out.push('n'),
                'ò' | 'ó' | 'ô' | 'õ' | 'ö' => out.push('o'),
                'ù' | 'ú' | 'û' | 'ü' => out.push('u'),
                'ý' | 'ÿ' => out.push('y'),
                'œ' => out.push_str("oe"),
                'æ' => out.push_str("ae"),
                other => out.push(other),
            }
        }
    }
    out
}

/// Fold and split a query into distinct search tokens, dropping stop words.
pub fn tokenize(query: &str) -> Vec<String> {
    let folded = fold(query);
    let mut seen = HashSet::new();
    folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2 && !STOP_WORDS.contains(t))
        .filter(|t| seen.insert(t.to_string()))
        .map(String::from)
        .collect()
}

/// A lexical candidate source.
pub trait LexicalSearch: Send + Sync {
    /// Scored candidates, best first, at most `limit`.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<RetrievalChunk>, RetrievalError>;
}

struct IndexedDocument {
    document: Document,
    title: String,
    tags: String,
    excerpt: String,
    content: String,
}

impl IndexedDocument {
    fn new(document: Document) -> Self {
        Self {
            title: fold(&document.title),
            tags: fold(&document.tags.join(" ")),
            excerpt: fold(&document.excerpt),
            content: fold(&document.content),
            document,
        }
    }

    fn raw_score(&self, tokens: &[String]) -> f32 {
        tokens
            .iter()
            .map(|t| {
                let mut s = 0.0;
                if self.title.contains(t.as_str()) {
                    s += TITLE_WEIGHT;
                }
                if self.tags.contains(t.as_str()) {
                    s += TAGS_WEIGHT;
                }
                if self.excerpt.contains(t.as_str()) {
                    s += EXCERPT_WEIGHT;
                }
                if self.content.contains(t.as_str()) {
                    s += CONTENT_WEIGHT;
                }
                s
            })
            .sum()
    }
}

/// Immutable in-memory lexical index.
pub struct LexicalIndex {
    docs: Vec<IndexedDocument>,
}

impl LexicalIndex {
    /// Index `documents`. Empty or duplicate ids are rejected.
    pub fn build(documents: Vec<Document>) -> Result<Self, RetrievalError> {
        let mut ids = HashSet::new();
        for doc in &documents {
            if doc.id.trim().is_empty() {
                return Err(RetrievalError::MalformedIndex(format!(
                    "document '{}' has an empty id",
                    doc.title
                )));
            }
            if !ids.insert(doc.id.as_str()) {
                return Err(RetrievalError::MalformedIndex(format!(
                    "duplicate document id '{}'",
                    doc.id
                )));
            }
        }

        Ok(Self {
            docs: documents.into_iter().map(IndexedDocument::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter().map(|d| &d.document)
    }
}

impl LexicalSearch for LexicalIndex {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<RetrievalChunk>, RetrievalError> {
        let tokens = tokenize(query);
        if tokens.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let max = MAX_TOKEN_SCORE * tokens.len() as f32;

        let mut scored: Vec<RetrievalChunk> = self
            .docs
            .iter()
            .filter_map(|d| {
                let raw = d.raw_score(&tokens);
                (raw > 0.0).then(|| d.document.to_chunk(raw / max))
            })
            .collect();

        // Stable: equal scores keep corpus order.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierwise_core::retrieval::{AuthorityLevel, SourceMetadata};

    fn doc(id: &str, title: &str, tags: &[&str], excerpt: &str, content: &str) -> Document {
        Document {
            id: id.into(),
            title: title.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            excerpt: excerpt.into(),
            content: content.into(),
            authority: AuthorityLevel::B,
            metadata: SourceMetadata::default(),
            embedding: None,
        }
    }

    fn corpus() -> LexicalIndex {
        LexicalIndex::build(vec![
            doc(
                "baudelaire",
                "Baudelaire et la modernité",
                &["poésie", "symbolisme"],
                "Le spleen de Paris",
                "Les Fleurs du mal paraissent en 1857.",
            ),
            doc(
                "voltaire",
                "Candide ou l'optimisme",
                &["conte philosophique"],
                "Voltaire raille Leibniz",
                "Il faut cultiver notre jardin. La poésie n'y est pas.",
            ),
            doc(
                "hugo",
                "Victor Hugo, poète engagé",
                &["romantisme"],
                "Les Contemplations",
                "Demain, dès l'aube.",
            ),
        ])
        .unwrap()
    }

    #[test]
    fn fold_strips_case_and_accents() {
        assert_eq!(fold("Poésie Élégiaque"), "poesie elegiaque");
        assert_eq!(fold("Cœur ÇA"), "coeur ca");
    }

    #[test]
    fn tokenize_drops_stop_words_and_duplicates() {
        assert_eq!(tokenize("La poésie de la poésie"), vec!["poesie"]);
        assert_eq!(tokenize("  "), Vec::<String>::new());
        assert_eq!(tokenize("a l' et"), Vec::<String>::new());
    }

    #[test]
    fn field_weights_order_results() {
        let index = corpus();
        let hits = index.search("poésie", 10).unwrap();
        // Tags (×3) beat content only (×1)
        assert_eq!(hits[0].document_id, "baudelaire");
        assert_eq!(hits[1].document_id, "voltaire");
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn title_match_scores_highest() {
        let index = corpus();
        let hits = index.search("candide", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 0.4).abs() < 1e-6);
    }

    #[test]
    fn scores_are_normalised() {
        let index = corpus();
        for query in ["poésie baudelaire", "hugo", "jardin leibniz candide"] {
            for hit in index.search(query, 10).unwrap() {
                assert!(hit.score > 0.0 && hit.score <= 1.0, "{query}: {}", hit.score);
            }
        }
    }

    #[test]
    fn empty_and_unmatched_queries_return_nothing() {
        let index = corpus();
        assert!(index.search("", 5).unwrap().is_empty());
        assert!(index.search("thermodynamique", 5).unwrap().is_empty());
        assert!(index.search("poésie", 0).unwrap().is_empty());
    }

    #[test]
    fn limit_is_respected() {
        let index = corpus();
        assert_eq!(index.search("poésie", 1).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let result = LexicalIndex::build(vec![
            doc("x", "a", &[], "", ""),
            doc("x", "b", &[], "", ""),
        ]);
        assert!(matches!(result, Err(RetrievalError::MalformedIndex(_))));
    }

    #[test]
    fn empty_id_is_rejected() {
        let result = LexicalIndex::build(vec![doc(" ", "a", &[], "", "")]);
        assert!(matches!(result, Err(RetrievalError::MalformedIndex(_))));
    }
}
