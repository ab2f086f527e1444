//! Generation pipeline: retrieval, routing, assembly and generation with
//! circuit-breaker feedback.
//!
//! ```text
//! request ─► retrieve ─► estimate ─► route ─► assemble ─► provider
//!                                      ▲                     │
//!                                      └── fallback_after ◄──┘ (error / timeout)
//! ```
//!
//! Every attempt reports its outcome to the breaker registry of the tier
//! that served it. A failed attempt moves to the next tier in cascade order
//! and re-assembles the context for that tier's budget.

use crate::context::{AssembledContext, AssemblyMetadata, build_context, token};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tierwise_core::error::{Error, ProviderError, Result};
use tierwise_core::message::Message;
use tierwise_core::provider::{ChunkReceiver, GenerationOptions, Provider, ProviderRequest, ProviderResponse};
use tierwise_core::retrieval::{ContextHint, RetrievalChunk};
use tierwise_core::skill::Skill;
use tierwise_core::tier::Tier;
use tierwise_providers::router::{RoutingRequest, SelectedProvider, TierRouter};
use tierwise_retrieval::HybridRetriever;
use tracing::{debug, info, warn};

/// Knobs for [`GenerationPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Per-attempt timeout.
    pub request_timeout: Duration,
    /// Attempts across the cascade, at least 1.
    pub max_attempts: u32,
    /// Options used when a request carries none.
    pub default_options: GenerationOptions,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            max_attempts: 2,
            default_options: GenerationOptions {
                max_tokens: Some(2048),
                ..GenerationOptions::default()
            },
        }
    }
}

impl From<&tierwise_config::AppConfig> for PipelineSettings {
    fn from(config: &tierwise_config::AppConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.router.request_timeout_secs),
            max_attempts: config.router.max_attempts,
            default_options: GenerationOptions {
                temperature: config.router.default_temperature,
                max_tokens: Some(config.router.default_max_tokens),
                json_mode: false,
            },
        }
    }
}

/// One generation request from the tutoring application.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub skill: Skill,
    pub system_prompt: String,
    pub user_message: String,
    /// Oldest first.
    pub history: Vec<Message>,
    pub retrieval_query: Option<String>,
    pub hint: Option<ContextHint>,
    pub user_id: Option<String>,
    pub streaming: bool,
    pub options: Option<GenerationOptions>,
}

impl GenerationRequest {
    pub fn new(
        skill: impl Into<Skill>,
        system_prompt: impl Into<String>,
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            skill: skill.into(),
            system_prompt: system_prompt.into(),
            user_message: user_message.into(),
            history: Vec::new(),
            retrieval_query: None,
            hint: None,
            user_id: None,
            streaming: false,
            options: None,
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_retrieval(mut self, query: impl Into<String>, hint: Option<ContextHint>) -> Self {
        self.retrieval_query = Some(query.into());
        self.hint = hint;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Everything needed to call a provider, before the call is made.
pub struct PreparedGeneration {
    pub selected: SelectedProvider,
    pub context: AssembledContext,
    pub request: ProviderRequest,
    pub passages: Vec<RetrievalChunk>,
    /// Size estimate used for routing.
    pub estimated_tokens: usize,
}

/// A failed attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub tier: Tier,
    pub model: String,
    pub error: String,
}

/// A completed generation.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub response: ProviderResponse,
    pub tier: Tier,
    pub model: String,
    /// Failed attempts before the successful one.
    pub attempts: Vec<AttemptRecord>,
    pub context: AssemblyMetadata,
    pub passages: Vec<RetrievalChunk>,
}

/// An established stream.
pub struct StreamingGeneration {
    pub receiver: ChunkReceiver,
    pub tier: Tier,
    pub model: String,
    pub attempts: Vec<AttemptRecord>,
    pub context: AssemblyMetadata,
}

struct Completed<T> {
    value: T,
    selected: SelectedProvider,
    context: AssembledContext,
    attempts: Vec<AttemptRecord>,
    passages: Vec<RetrievalChunk>,
}

pub struct GenerationPipeline {
    router: Arc<TierRouter>,
    retriever: Option<Arc<HybridRetriever>>,
    settings: PipelineSettings,
}

impl GenerationPipeline {
    pub fn new(
        router: Arc<TierRouter>,
        retriever: Option<Arc<HybridRetriever>>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            router,
            retriever,
            settings,
        }
    }

    /// Build router, retriever and settings from configuration.
    pub fn from_config(config: &tierwise_config::AppConfig) -> Result<Self> {
        let router = Arc::new(tierwise_providers::build_from_config(config));
        let retriever = crate::build_retriever(config)?.map(Arc::new);
        Ok(Self::new(router, retriever, PipelineSettings::from(config)))
    }

    pub fn router(&self) -> &Arc<TierRouter> {
        &self.router
    }

    pub fn retriever(&self) -> Option<&Arc<HybridRetriever>> {
        self.retriever.as_ref()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Retrieve, estimate, route and assemble without calling a provider.
    pub async fn prepare(&self, request: &GenerationRequest) -> Result<PreparedGeneration> {
        let passages = self.retrieve(request).await?;
        let estimated_tokens = estimate_request_tokens(request, &passages);

        let mut routing = RoutingRequest::new(request.skill.clone())
            .with_context_tokens(estimated_tokens)
            .streaming(request.streaming);
        if let Some(user) = &request.user_id {
            routing = routing.with_user(user.clone());
        }
        let selected = self.router.select_provider(&routing);

        let context = self.assemble(request, &passages, &selected);
        let provider_request = self.provider_request(request, &selected, &context);

        Ok(PreparedGeneration {
            selected,
            context,
            request: provider_request,
            passages,
            estimated_tokens,
        })
    }

    /// Generate a complete response, retrying on the next tier on failure.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        let prepared = self.prepare(request).await?;
        let done = self
            .run_with_fallback(request, prepared, |provider, req| async move {
                provider.complete(req).await
            })
            .await?;

        info!(
            tier = %done.selected.tier,
            model = %done.selected.model,
            failed_attempts = done.attempts.len(),
            "Generation complete"
        );

        Ok(GenerationOutcome {
            response: done.value,
            tier: done.selected.tier,
            model: done.selected.model,
            attempts: done.attempts,
            context: done.context.metadata,
            passages: done.passages,
        })
    }

    /// Establish a stream. The breaker is updated once the stream is open;
    /// chunks are passed through untouched.
    pub async fn stream(&self, request: &GenerationRequest) -> Result<StreamingGeneration> {
        let mut request = request.clone();
        request.streaming = true;

        let prepared = self.prepare(&request).await?;
        let done = self
            .run_with_fallback(&request, prepared, |provider, req| async move {
                provider.stream(req).await
            })
            .await?;

        Ok(StreamingGeneration {
            receiver: done.value,
            tier: done.selected.tier,
            model: done.selected.model,
            attempts: done.attempts,
            context: done.context.metadata,
        })
    }

    async fn retrieve(&self, request: &GenerationRequest) -> Result<Vec<RetrievalChunk>> {
        let Some(query) = request.retrieval_query.as_deref() else {
            return Ok(Vec::new());
        };
        let Some(retriever) = &self.retriever else {
            debug!("Retrieval requested but no corpus is loaded");
            return Ok(Vec::new());
        };

        let depth = self
            .router
            .tiers()
            .iter()
            .map(|p| p.budget.max_chunks)
            .max()
            .unwrap_or(0);
        Ok(retriever.search(query, depth, request.hint.as_ref()).await?)
    }

    fn assemble(
        &self,
        request: &GenerationRequest,
        passages: &[RetrievalChunk],
        selected: &SelectedProvider,
    ) -> AssembledContext {
        build_context(
            &request.system_prompt,
            &request.user_message,
            passages,
            &request.history,
            self.router.profile(selected.tier),
        )
    }

    fn provider_request(
        &self,
        request: &GenerationRequest,
        selected: &SelectedProvider,
        context: &AssembledContext,
    ) -> ProviderRequest {
        let options = request
            .options
            .as_ref()
            .unwrap_or(&self.settings.default_options);
        let mut req = ProviderRequest::new(selected.model.clone(), context.messages.clone(), options);
        req.stream = request.streaming;
        req
    }

    async fn run_with_fallback<T, F, Fut>(
        &self,
        request: &GenerationRequest,
        prepared: PreparedGeneration,
        call: F,
    ) -> Result<Completed<T>>
    where
        F: Fn(Arc<dyn Provider>, ProviderRequest) -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        let PreparedGeneration {
            mut selected,
            mut context,
            request: mut provider_request,
            passages,
            ..
        } = prepared;
        let max_attempts = self.settings.max_attempts.max(1);
        let timeout = self.settings.request_timeout;
        let mut attempts = Vec::new();
        let mut last_error = ProviderError::NotConfigured("no generation attempt was made".into());

        for attempt in 1..=max_attempts {
            let tier = selected.tier;
            debug!(tier = %tier, model = %selected.model, attempt, "Generation attempt");

            let result =
                tokio::time::timeout(timeout, call(selected.provider.clone(), provider_request.clone()))
                    .await;
            let error = match result {
                Ok(Ok(value)) => {
                    self.router.record_success(tier);
                    return Ok(Completed {
                        value,
                        selected,
                        context,
                        attempts,
                        passages,
                    });
                }
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(format!(
                    "tier '{tier}' did not answer within {}s",
                    timeout.as_secs()
                )),
            };

            self.router.record_error(tier);
            warn!(
                tier = %tier,
                model = %selected.model,
                attempt,
                error = %error,
                "Generation attempt failed"
            );
            attempts.push(AttemptRecord {
                tier,
                model: selected.model.clone(),
                error: error.to_string(),
            });
            last_error = error;

            if attempt == max_attempts || tier == Tier::Local {
                break;
            }
            selected = self.router.fallback_after(tier);
            context = self.assemble(request, &passages, &selected);
            provider_request = self.provider_request(request, &selected, &context);
        }

        Err(Error::Provider(last_error))
    }
}

/// Context size used for routing: every message with its overhead, plus the
/// full text of retrieved passages.
pub fn estimate_request_tokens(request: &GenerationRequest, passages: &[RetrievalChunk]) -> usize {
    let base = token::estimate_message_tokens(&Message::system(request.system_prompt.as_str()))
        + token::estimate_message_tokens(&Message::user(request.user_message.as_str()));
    let history = token::estimate_messages_tokens(&request.history);
    let retrieval: usize = passages
        .iter()
        .map(|p| token::estimate_tokens(&p.content))
        .sum();
    base + history + retrieval
}
