//! # tierwise core
//!
//! Domain types, traits, and error definitions for the tierwise request
//! routing and context assembly engine. Every other crate depends inward
//! on this one.
//!
//! ## Design Philosophy
//!
//! Collaborators at the edges of the engine are traits defined here:
//! - [`Provider`] is a generation capability (one per tier)
//! - retrieval backends live behind traits in `tierwise-retrieval`
//!
//! Tiers, skills and retrieval chunks are plain value types so that the
//! router and assembler stay pure in-memory bookkeeping.

pub mod error;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod skill;
pub mod tier;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, RetrievalError};
pub use message::{Message, Role};
pub use provider::{GenerationOptions, Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use retrieval::{AuthorityLevel, ContextHint, Document, RetrievalChunk, SourceMetadata};
pub use skill::Skill;
pub use tier::{ContextBudget, Tier, TierProfile, TierTable};
