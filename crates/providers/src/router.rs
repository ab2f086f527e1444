//! Tier router: selects a healthy tier and its capability for a request.
//!
//! Selection runs in four steps:
//! 1. the skill's default tier (built-in table, optionally overridden)
//! 2. context-size degradation towards tiers with strictly larger capacity
//! 3. circuit-breaker cascade from that tier, `local` when all are open
//! 4. availability gate: disabled router or no credential ⇒ `local`
//!
//! Selection is in-memory bookkeeping only and never fails.

use crate::circuit::CircuitBreakerRegistry;
use crate::openai_compat::OpenAiCompatProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tierwise_core::provider::Provider;
use tierwise_core::skill::Skill;
use tierwise_core::tier::{Tier, TierProfile, TierTable};
use tracing::debug;

/// Inputs of one routing call.
#[derive(Debug, Clone)]
pub struct RoutingRequest {
    pub skill: Skill,
    /// Estimated or measured prompt size in tokens.
    pub estimated_context_tokens: usize,
    /// Only used for logging.
    pub user_id: Option<String>,
    pub streaming: bool,
}

impl RoutingRequest {
    pub fn new(skill: impl Into<Skill>) -> Self {
        Self {
            skill: skill.into(),
            estimated_context_tokens: 0,
            user_id: None,
            streaming: false,
        }
    }

    pub fn with_context_tokens(mut self, tokens: usize) -> Self {
        self.estimated_context_tokens = tokens;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

/// The routing result. Ephemeral, never persisted.
#[derive(Clone)]
pub struct SelectedProvider {
    pub tier: Tier,
    pub provider: Arc<dyn Provider>,
    pub model: String,
}

impl std::fmt::Debug for SelectedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedProvider")
            .field("tier", &self.tier)
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

/// Routes generation requests to a tier.
pub struct TierRouter {
    tiers: TierTable,
    breakers: Arc<CircuitBreakerRegistry>,
    providers: HashMap<Tier, Arc<dyn Provider>>,
    local: Arc<dyn Provider>,
    skill_overrides: HashMap<Skill, Tier>,
    enabled: bool,
    remote_credentials: bool,
}

impl TierRouter {
    /// Create a router. `local` is the unconditional fallback capability.
    pub fn new(
        tiers: TierTable,
        breakers: Arc<CircuitBreakerRegistry>,
        local: Arc<dyn Provider>,
    ) -> Self {
        Self {
            tiers,
            breakers,
            providers: HashMap::new(),
            local,
            skill_overrides: HashMap::new(),
            enabled: true,
            remote_credentials: true,
        }
    }

    /// Register the capability serving a cascade tier.
    pub fn register(mut self, tier: Tier, provider: Arc<dyn Provider>) -> Self {
        if tier == Tier::Local {
            self.local = provider;
        } else {
            self.providers.insert(tier, provider);
        }
        self
    }

    pub fn with_skill_overrides(mut self, overrides: HashMap<Skill, Tier>) -> Self {
        self.skill_overrides = overrides;
        self
    }

    /// Operational kill-switch.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_remote_credentials(mut self, present: bool) -> Self {
        self.remote_credentials = present;
        self
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    pub fn profile(&self, tier: Tier) -> &TierProfile {
        self.tiers.profile(tier)
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Whether remote tiers may be selected at all.
    pub fn remote_available(&self) -> bool {
        self.enabled && self.remote_credentials
    }

    /// The skill's tier before any degradation.
    pub fn default_tier(&self, skill: &Skill) -> Tier {
        self.skill_overrides
            .get(skill)
            .copied()
            .unwrap_or_else(|| skill.default_tier())
    }

    /// Select a tier and capability for `request`. Never fails.
    pub fn select_provider(&self, request: &RoutingRequest) -> SelectedProvider {
        if !self.remote_available() {
            debug!(
                skill = %request.skill,
                enabled = self.enabled,
                credentials = self.remote_credentials,
                "Remote tiers unavailable, routing to local"
            );
            return self.selection(Tier::Local);
        }

        let default = self.default_tier(&request.skill);
        let sized = self.degrade(default, request.estimated_context_tokens);
        let tier = match sized.cascade_position() {
            Some(pos) => self.first_closed(pos),
            None => Tier::Local,
        };

        debug!(
            skill = %request.skill,
            context_tokens = request.estimated_context_tokens,
            user = request.user_id.as_deref().unwrap_or("-"),
            streaming = request.streaming,
            default_tier = %default,
            sized_tier = %sized,
            tier = %tier,
            "Tier selected"
        );

        self.selection(tier)
    }

    /// Next usable tier strictly after `tier` in cascade order, `local` when
    /// none is left. Used by callers retrying after a failure on `tier`.
    pub fn fallback_after(&self, tier: Tier) -> SelectedProvider {
        if !self.remote_available() {
            return self.selection(Tier::Local);
        }
        let next = match tier.cascade_position() {
            Some(pos) => self.first_closed(pos + 1),
            None => Tier::Local,
        };
        debug!(failed_tier = %tier, tier = %next, "Cascade fallback");
        self.selection(next)
    }

    pub fn record_error(&self, tier: Tier) {
        self.breakers.record_error(tier);
    }

    pub fn record_success(&self, tier: Tier) {
        self.breakers.record_success(tier);
    }

    pub fn reset_circuits(&self) {
        self.breakers.reset_all();
    }

    /// Move towards tiers with strictly larger capacity until the context
    /// fits. Never moves below the starting tier.
    fn degrade(&self, start: Tier, tokens: usize) -> Tier {
        let mut tier = start;
        while tokens > self.tiers.capacity(tier) {
            match self.next_larger(tier) {
                Some(next) => tier = next,
                None => break,
            }
        }
        tier
    }

    fn next_larger(&self, tier: Tier) -> Option<Tier> {
        let pos = tier.cascade_position()?;
        let capacity = self.tiers.capacity(tier);
        Tier::CASCADE[pos + 1..]
            .iter()
            .copied()
            .find(|t| self.tiers.capacity(*t) > capacity)
    }

    /// First cascade tier at or after `pos` that has a capability and a
    /// closed circuit.
    fn first_closed(&self, pos: usize) -> Tier {
        Tier::CASCADE
            .iter()
            .skip(pos)
            .copied()
            .find(|t| self.providers.contains_key(t) && !self.breakers.is_open(*t))
            .unwrap_or(Tier::Local)
    }

    fn selection(&self, tier: Tier) -> SelectedProvider {
        let provider = self
            .providers
            .get(&tier)
            .cloned()
            .unwrap_or_else(|| self.local.clone());
        SelectedProvider {
            tier,
            provider,
            model: self.tiers.model(tier).to_string(),
        }
    }
}

/// Build a router from configuration.
///
/// Every cascade tier shares one OpenAI-compatible client pointed at the
/// remote endpoint; each tier is distinguished by its model name. The
/// local tier talks to the local endpoint.
pub fn build_from_config(config: &tierwise_config::AppConfig) -> TierRouter {
    let breakers = Arc::new(CircuitBreakerRegistry::with_threshold(
        config.router.breaker_threshold,
    ));
    let local: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::ollama(Some(
        &config.endpoints.local_url,
    )));

    let mut router = TierRouter::new(config.tier_table(), breakers, local)
        .with_skill_overrides(config.skill_overrides())
        .with_enabled(config.router.enabled)
        .with_remote_credentials(config.has_remote_credentials());

    if let Some(remote) = build_remote_provider(config) {
        for tier in Tier::CASCADE {
            router = router.register(tier, remote.clone());
        }
    }

    router
}

/// The shared remote capability, if a credential is configured.
pub fn build_remote_provider(config: &tierwise_config::AppConfig) -> Option<Arc<dyn Provider>> {
    let api_key = config.api_key.as_deref().filter(|k| !k.trim().is_empty())?;
    Some(Arc::new(OpenAiCompatProvider::new(
        "remote",
        &config.endpoints.remote_url,
        api_key,
    )))
}
