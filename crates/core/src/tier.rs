//! Tiers: named classes of generation capability.
//!
//! Each tier carries a context budget (how much prompt it may receive) and
//! a model identity. The table is built once at startup and is immutable
//! afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A generation tier.
///
/// `local` is the unconditional fallback: it has no circuit breaker and is
/// never part of the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Reasoning,
    Large,
    Standard,
    Micro,
    Local,
}

impl Tier {
    /// Fixed order in which remote tiers are tried.
    pub const CASCADE: [Tier; 4] = [Tier::Reasoning, Tier::Large, Tier::Standard, Tier::Micro];

    /// Every tier, cascade first then `local`.
    pub const ALL: [Tier; 5] = [
        Tier::Reasoning,
        Tier::Large,
        Tier::Standard,
        Tier::Micro,
        Tier::Local,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Reasoning => "reasoning",
            Tier::Large => "large",
            Tier::Standard => "standard",
            Tier::Micro => "micro",
            Tier::Local => "local",
        }
    }

    /// Dense index, usable for fixed-size per-tier storage.
    pub fn index(&self) -> usize {
        match self {
            Tier::Reasoning => 0,
            Tier::Large => 1,
            Tier::Standard => 2,
            Tier::Micro => 3,
            Tier::Local => 4,
        }
    }

    /// Position in [`Tier::CASCADE`], `None` for `local`.
    pub fn cascade_position(&self) -> Option<usize> {
        Tier::CASCADE.iter().position(|t| t == self)
    }

    /// Whether this tier talks to a remote backend (and has a breaker).
    pub fn is_remote(&self) -> bool {
        !matches!(self, Tier::Local)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reasoning" => Ok(Tier::Reasoning),
            "large" => Ok(Tier::Large),
            "standard" => Ok(Tier::Standard),
            "micro" => Ok(Tier::Micro),
            "local" => Ok(Tier::Local),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

/// The four limits that bound an assembled prompt for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    /// Maximum estimated input tokens of the whole message sequence.
    pub max_input_tokens: usize,
    /// Maximum number of retrieval passages.
    pub max_chunks: usize,
    /// Maximum estimated tokens per retrieval passage.
    pub max_tokens_per_chunk: usize,
    /// Maximum retained conversation turns.
    pub max_turns: usize,
}

/// Static configuration of one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierProfile {
    pub tier: Tier,
    /// Model name sent to the backend.
    pub model: String,
    pub budget: ContextBudget,
}

impl TierProfile {
    fn new(
        tier: Tier,
        model: &str,
        max_input_tokens: usize,
        max_chunks: usize,
        max_tokens_per_chunk: usize,
        max_turns: usize,
    ) -> Self {
        Self {
            tier,
            model: model.to_string(),
            budget: ContextBudget {
                max_input_tokens,
                max_chunks,
                max_tokens_per_chunk,
                max_turns,
            },
        }
    }

    /// Built-in defaults, sized after the real context windows of the
    /// default models.
    pub fn default_for(tier: Tier) -> Self {
        match tier {
            Tier::Reasoning => Self::new(tier, "openai/o4-mini", 100_000, 8, 800, 10),
            Tier::Large => Self::new(tier, "anthropic/claude-sonnet-4", 200_000, 12, 1_000, 20),
            Tier::Standard => Self::new(tier, "google/gemini-2.5-flash", 1_000_000, 10, 800, 16),
            Tier::Micro => Self::new(tier, "google/gemini-2.5-flash-lite", 1_000_000, 4, 400, 6),
            Tier::Local => Self::new(tier, "llama3.1:8b", 8_000, 3, 300, 4),
        }
    }
}

/// Immutable per-tier configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    profiles: [TierProfile; 5],
}

impl TierTable {
    /// Replace one tier's profile (builder style, used while loading config).
    pub fn with_profile(mut self, profile: TierProfile) -> Self {
        let idx = profile.tier.index();
        self.profiles[idx] = profile;
        self
    }

    pub fn profile(&self, tier: Tier) -> &TierProfile {
        &self.profiles[tier.index()]
    }

    pub fn budget(&self, tier: Tier) -> ContextBudget {
        self.profile(tier).budget
    }

    pub fn model(&self, tier: Tier) -> &str {
        &self.profile(tier).model
    }

    pub fn capacity(&self, tier: Tier) -> usize {
        self.profile(tier).budget.max_input_tokens
    }

    pub fn iter(&self) -> impl Iterator<Item = &TierProfile> {
        self.profiles.iter()
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            profiles: Tier::ALL.map(TierProfile::default_for),
        }
    }
}
