//! JSON corpus loading.
//!
//! A corpus file is a JSON array of [`Document`] records.

use std::path::Path;
use tierwise_core::error::RetrievalError;
use tierwise_core::retrieval::Document;
use tracing::debug;

/// Load every document from `path`.
pub fn load_corpus(path: &Path) -> Result<Vec<Document>, RetrievalError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RetrievalError::Corpus(format!("failed to read {}: {e}", path.display()))
    })?;
    let documents = parse_corpus(&content)
        .map_err(|e| RetrievalError::Corpus(format!("{}: {e}", path.display())))?;
    debug!(path = %path.display(), count = documents.len(), "Corpus loaded");
    Ok(documents)
}

/// Parse a corpus from JSON text.
pub fn parse_corpus(json: &str) -> Result<Vec<Document>, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tierwise_core::retrieval::AuthorityLevel;

    const SAMPLE: &str = r#"[
        {
            "id": "hugo-contemplations",
            "title": "Les Contemplations",
            "tags": ["poésie", "romantisme"],
            "excerpt": "Recueil de 1856",
            "content": "Demain, dès l'aube, à l'heure où blanchit la campagne...",
            "authority": "A",
            "metadata": {"work": "Les Contemplations", "thematic_path": "poesie/romantisme"},
            "embedding": [0.1, 0.2]
        },
        {"id": "fiche-2", "title": "Fiche méthode"}
    ]"#;

    #[test]
    fn parses_full_and_minimal_records() {
        let docs = parse_corpus(SAMPLE).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].authority, AuthorityLevel::A);
        assert_eq!(docs[0].metadata.thematic_path.as_deref(), Some("poesie/romantisme"));
        assert_eq!(docs[0].embedding.as_deref(), Some(&[0.1, 0.2][..]));
        assert_eq!(docs[1].authority, AuthorityLevel::D);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let docs = load_corpus(file.path()).unwrap();
        assert_eq!(docs[1].id, "fiche-2");
    }

    #[test]
    fn missing_file_is_a_corpus_error() {
        let result = load_corpus(Path::new("/nonexistent/corpus.json"));
        assert!(matches!(result, Err(RetrievalError::Corpus(_))));
    }

    #[test]
    fn invalid_json_is_a_corpus_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();
        assert!(matches!(load_corpus(file.path()), Err(RetrievalError::Corpus(_))));
    }
}
