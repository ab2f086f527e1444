//! Tier routing for Tierwise.
//!
//! The router maps a skill and a context size onto one of the model tiers,
//! skipping tiers whose circuit breaker is open. All generation backends
//! implement the `tierwise_core::Provider` trait.

pub mod circuit;
pub mod openai_compat;
pub mod router;

pub use circuit::{CircuitBreakerRegistry, CircuitSnapshot};
pub use openai_compat::OpenAiCompatProvider;
pub use router::{RoutingRequest, SelectedProvider, TierRouter, build_from_config, build_remote_provider};
