//! Metadata rerank: favour passages from the work or theme the caller is on.

use crate::lexical::fold;
use tierwise_core::retrieval::{ContextHint, RetrievalChunk};

/// Whether `chunk`'s source metadata matches `hint`.
///
/// Works match on folded equality. A thematic path matches when the chunk's
/// path equals the hint's path or sits below it.
pub fn matches_hint(chunk: &RetrievalChunk, hint: &ContextHint) -> bool {
    let work_match = match (&hint.work, &chunk.metadata.work) {
        (Some(wanted), Some(actual)) => fold(wanted.trim()) == fold(actual.trim()),
        _ => false,
    };
    if work_match {
        return true;
    }

    match (&hint.thematic_path, &chunk.metadata.thematic_path) {
        (Some(wanted), Some(actual)) => {
            let wanted = fold(wanted.trim().trim_end_matches('/'));
            let actual = fold(actual.trim());
            !wanted.is_empty()
                && (actual == wanted || actual.starts_with(&format!("{wanted}/")))
        }
        _ => false,
    }
}

/// Multiply matching scores by `boost` and re-sort, keeping order among ties.
pub fn rerank_by_metadata(chunks: &mut [RetrievalChunk], hint: &ContextHint, boost: f32) {
    if hint.is_empty() {
        return;
    }
    for chunk in chunks.iter_mut() {
        if matches_hint(chunk, hint) {
            chunk.score *= boost;
        }
    }
    chunks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}
