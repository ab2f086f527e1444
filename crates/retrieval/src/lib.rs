//! Hybrid retrieval for Tierwise.
//!
//! Lexical and vector candidates are merged with Reciprocal Rank Fusion and
//! reranked by metadata affinity. The vector side is best-effort; lexical
//! results are always returned.

pub mod corpus;
pub mod fusion;
pub mod hybrid;
pub mod lexical;
pub mod rerank;
pub mod vector;

pub use corpus::load_corpus;
pub use fusion::reciprocal_rank_fusion;
pub use hybrid::{HybridRetriever, RetrievalMode, RetrievalSettings};
pub use lexical::{LexicalIndex, LexicalSearch};
pub use vector::{InMemoryVectorIndex, VectorOutcome, VectorSearch, cosine_similarity};
