//! Token-budgeted context assembly.
//!
//! # Context Layers (in emission order)
//!
//! | Layer | Source | Trim Strategy |
//! |-------|--------|---------------|
//! | 1. System | Caller's system prompt | Never trimmed |
//! | 2. Retrieval | Fused passages | Lowest score + authority dropped, long passages cut |
//! | 3. History | Conversation turns | First turn kept, oldest middle turns dropped |
//! | 4. User | Current message | Never trimmed |

pub mod assembler;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblyInput, AssemblyMetadata, ContextAssembler, DropInfo, LayerStats,
    TRUNCATION_MARKER, build_context,
};
