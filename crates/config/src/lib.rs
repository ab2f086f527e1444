//! Configuration loading, validation, and management for tierwise.
//!
//! Loads configuration from `~/.tierwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tierwise_core::skill::Skill;
use tierwise_core::tier::{Tier, TierProfile, TierTable};

/// The root configuration structure.
///
/// Maps directly to `~/.tierwise/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Credential for the remote tiers. Absent ⇒ every request routes to `local`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Router settings
    #[serde(default)]
    pub router: RouterConfig,

    /// Per-tier overrides, keyed by tier name
    #[serde(default)]
    pub tiers: HashMap<String, TierOverrideConfig>,

    /// Backend endpoints
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    /// Hybrid retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("router", &self.router)
            .field("tiers", &self.tiers)
            .field("endpoints", &self.endpoints)
            .field("retrieval", &self.retrieval)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Operational kill-switch. `false` ⇒ every request routes to `local`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Consecutive failures that open a tier's circuit
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,

    /// Timeout of a single generation attempt
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Attempts across the cascade before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Skill name → tier name, overriding the built-in table
    #[serde(default)]
    pub skill_tiers: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}
fn default_breaker_threshold() -> u32 {
    3
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_max_attempts() -> u32 {
    2
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            breaker_threshold: default_breaker_threshold(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            skill_tiers: HashMap::new(),
        }
    }
}

/// Partial override of a tier profile. Unset fields keep the built-in value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierOverrideConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input_tokens: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chunks: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens_per_chunk: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<usize>,
}

impl TierOverrideConfig {
    fn apply(&self, mut profile: TierProfile) -> TierProfile {
        if let Some(model) = &self.model {
            profile.model = model.clone();
        }
        if let Some(v) = self.max_input_tokens {
            profile.budget.max_input_tokens = v;
        }
        if let Some(v) = self.max_chunks {
            profile.budget.max_chunks = v;
        }
        if let Some(v) = self.max_tokens_per_chunk {
            profile.budget.max_tokens_per_chunk = v;
        }
        if let Some(v) = self.max_turns {
            profile.budget.max_turns = v;
        }
        profile
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// OpenAI-compatible endpoint serving the remote tiers
    #[serde(default = "default_remote_url")]
    pub remote_url: String,

    /// OpenAI-compatible endpoint serving the local tier
    #[serde(default = "default_local_url")]
    pub local_url: String,

    /// Embedding model used to embed retrieval queries
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

fn default_remote_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_local_url() -> String {
    "http://localhost:11434/v1".into()
}
fn default_embedding_model() -> String {
    "openai/text-embedding-3-small".into()
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            remote_url: default_remote_url(),
            local_url: default_local_url(),
            embedding_model: default_embedding_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Reciprocal Rank Fusion constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,

    /// Candidates taken from each retrieval list before fusion
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool: usize,

    /// Vector search deadline; past it the query degrades to lexical-only
    #[serde(default = "default_vector_timeout_ms")]
    pub vector_timeout_ms: u64,

    /// Multiplicative boost for results matching the caller's context hint
    #[serde(default = "default_metadata_boost")]
    pub metadata_boost: f32,

    /// JSON corpus of documents to index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_path: Option<String>,
}

fn default_rrf_k() -> u32 {
    60
}
fn default_candidate_pool() -> usize {
    20
}
fn default_vector_timeout_ms() -> u64 {
    1500
}
fn default_metadata_boost() -> f32 {
    1.5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            candidate_pool: default_candidate_pool(),
            vector_timeout_ms: default_vector_timeout_ms(),
            metadata_boost: default_metadata_boost(),
            corpus_path: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Bearer token required by the circuit reset endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            admin_token: None,
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("admin_token", &redact(&self.admin_token))
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.tierwise/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `TIERWISE_API_KEY`, then `OPENROUTER_API_KEY`
    /// - `TIERWISE_ROUTER_ENABLED` (`0`, `false`, `off` disable the router)
    /// - `TIERWISE_MODEL_<TIER>` per-tier model name
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_key = lookup("TIERWISE_API_KEY")
            .or_else(|| lookup("OPENROUTER_API_KEY"))
            .filter(|k| !k.trim().is_empty());
        if env_key.is_some() {
            self.api_key = env_key;
        }

        if let Some(flag) = lookup("TIERWISE_ROUTER_ENABLED") {
            let flag = flag.trim().to_ascii_lowercase();
            self.router.enabled = !matches!(flag.as_str(), "0" | "false" | "off" | "no");
        }

        for tier in Tier::ALL {
            let key = format!("TIERWISE_MODEL_{}", tier.as_str().to_ascii_uppercase());
            if let Some(model) = lookup(&key) {
                self.tiers.entry(tier.as_str().to_string()).or_default().model = Some(model);
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tierwise")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.router.default_temperature < 0.0 || self.router.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "router.default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.router.breaker_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "router.breaker_threshold must be at least 1".into(),
            ));
        }

        if self.router.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "router.max_attempts must be at least 1".into(),
            ));
        }

        if self.retrieval.rrf_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.rrf_k must be > 0".into(),
            ));
        }

        let boost = self.retrieval.metadata_boost;
        if boost.is_nan() || boost < 1.0 {
            return Err(ConfigError::ValidationError(
                "retrieval.metadata_boost must be >= 1.0".into(),
            ));
        }

        for (skill, tier) in &self.router.skill_tiers {
            tier.parse::<Tier>().map_err(|e| {
                ConfigError::ValidationError(format!("router.skill_tiers.{skill}: {e}"))
            })?;
        }

        for (name, over) in &self.tiers {
            name.parse::<Tier>()
                .map_err(|e| ConfigError::ValidationError(format!("tiers.{name}: {e}")))?;
            if over.max_input_tokens == Some(0) {
                return Err(ConfigError::ValidationError(format!(
                    "tiers.{name}.max_input_tokens must be > 0"
                )));
            }
        }

        Ok(())
    }

    /// Whether a remote-tier credential is present.
    pub fn has_remote_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Built-in tier table merged with `[tiers.*]` overrides.
    ///
    /// Unknown tier names are skipped here; `validate` rejects them at load time.
    pub fn tier_table(&self) -> TierTable {
        let mut table = TierTable::default();
        for (name, over) in &self.tiers {
            if let Ok(tier) = name.parse::<Tier>() {
                let profile = over.apply(table.profile(tier).clone());
                table = table.with_profile(profile);
            }
        }
        table
    }

    /// Skill → tier overrides from `router.skill_tiers`.
    pub fn skill_overrides(&self) -> HashMap<Skill, Tier> {
        self.router
            .skill_tiers
            .iter()
            .filter_map(|(skill, tier)| Some((Skill::parse(skill), tier.parse::<Tier>().ok()?)))
            .collect()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            router: RouterConfig::default(),
            tiers: HashMap::new(),
            endpoints: EndpointsConfig::default(),
            retrieval: RetrievalConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
