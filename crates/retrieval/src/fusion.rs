//! Reciprocal Rank Fusion (RRF): merge two ranked result lists.

use std::collections::HashMap;
use tierwise_core::retrieval::RetrievalChunk;

/// Standard RRF constant.
pub const DEFAULT_RRF_K: u32 = 60;

/// Fuse a lexical and a vector ranking.
///
/// Each document scores `1 / (k + rank)` per list it appears in, with
/// 1-based ranks. Documents are deduplicated by id; the lexical copy is kept
/// when a document appears in both. Equal scores keep first-seen order
/// (lexical list first). Nothing is truncated.
///
/// Returned scores are divided by the best attainable sum, `2 / (k + 1)`,
/// so they lie in (0, 1] like normalised lexical scores. Order is unaffected.
pub fn reciprocal_rank_fusion(
    lexical: &[RetrievalChunk],
    vector: &[RetrievalChunk],
    k: u32,
) -> Vec<RetrievalChunk> {
    let k = k as f64;
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut fused: Vec<(f64, RetrievalChunk)> = Vec::new();

    for list in [lexical, vector] {
        for (rank, chunk) in list.iter().enumerate() {
            let contribution = 1.0 / (k + rank as f64 + 1.0);
            match positions.get(chunk.document_id.as_str()) {
                Some(&pos) => fused[pos].0 += contribution,
                None => {
                    positions.insert(chunk.document_id.as_str(), fused.len());
                    fused.push((contribution, chunk.clone()));
                }
            }
        }
    }

    fused.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    let max_sum = 2.0 / (k + 1.0);
    fused
        .into_iter()
        .map(|(score, mut chunk)| {
            chunk.score = (score / max_sum) as f32;
            chunk
        })
        .collect()
}
