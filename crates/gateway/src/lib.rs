//! HTTP API gateway for Tierwise.
//!
//! Endpoints:
//!
//! - `GET  /health`                   : Liveness and routing availability
//! - `POST /v1/route`                 : Tier selection for a skill and context size
//! - `POST /v1/generate`              : Full pipeline, complete response
//! - `POST /v1/generate/stream`       : Full pipeline, SSE stream of chunks
//! - `POST /v1/search`                : Hybrid retrieval over the loaded corpus
//! - `GET  /v1/circuits`              : Circuit breaker snapshot
//! - `POST /v1/circuits/reset`        : Reset one (`?tier=`) or every circuit
//! - `POST /v1/circuits/{tier}/report`: Outcome report from an external adapter
//!
//! Built on Axum for high performance async HTTP.

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::{self, Next},
    response::sse::{Event as SseEvent, Sse},
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};

use tierwise_core::message::Message;
use tierwise_core::provider::Usage;
use tierwise_core::retrieval::{ContextHint, RetrievalChunk};
use tierwise_core::tier::Tier;
use tierwise_engine::{AssemblyMetadata, AttemptRecord, GenerationPipeline, GenerationRequest};
use tierwise_providers::{CircuitSnapshot, RoutingRequest};
use tierwise_retrieval::RetrievalMode;

/// Request body size limit.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub pipeline: Arc<GenerationPipeline>,
    /// Bearer token guarding circuit resets. `None` ⇒ unguarded.
    pub admin_token: Option<String>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl GatewayState {
    pub fn new(pipeline: Arc<GenerationPipeline>, admin_token: Option<String>) -> Self {
        Self {
            pipeline,
            admin_token: admin_token.filter(|t| !t.trim().is_empty()),
            start_time: chrono::Utc::now(),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - Bearer token authentication on the circuit reset route
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let admin = Router::new()
        .route("/circuits/reset", post(reset_circuits_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    let v1 = Router::new()
        .route("/route", post(route_handler))
        .route("/generate", post(generate_handler))
        .route("/generate/stream", post(generate_stream_handler))
        .route("/search", post(search_handler))
        .route("/circuits", get(circuits_handler))
        .route("/circuits/{tier}/report", post(report_handler))
        .merge(admin);

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn start(config: tierwise_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let pipeline = Arc::new(GenerationPipeline::from_config(&config)?);
    if !pipeline.router().remote_available() {
        warn!("Remote tiers unavailable (router disabled or no API key), every request routes to local");
    }
    let state = Arc::new(GatewayState::new(
        pipeline,
        config.gateway.admin_token.clone(),
    ));
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Errors ---

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

fn pipeline_error(e: tierwise_core::error::Error) -> ApiError {
    use tierwise_core::error::Error;
    let status = match &e {
        Error::Provider(_) => StatusCode::BAD_GATEWAY,
        Error::Retrieval(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

// --- Middleware ---

/// Require `Authorization: Bearer <admin_token>` when a token is configured.
async fn admin_auth_middleware(
    State(state): State<SharedState>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Ok(next.run(req).await);
    };

    let provided = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => Ok(next.run(req).await),
        _ => {
            warn!(path = %req.uri().path(), "Unauthorized admin request");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    remote_available: bool,
    retrieval: bool,
    uptime_secs: i64,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        remote_available: state.pipeline.router().remote_available(),
        retrieval: state.pipeline.retriever().is_some(),
        uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
    })
}

#[derive(Deserialize)]
struct RouteRequest {
    skill: String,
    #[serde(default)]
    context_tokens: usize,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    stream: bool,
}

#[derive(Serialize)]
struct RouteResponse {
    skill: String,
    default_tier: Tier,
    tier: Tier,
    model: String,
    remote_available: bool,
}

async fn route_handler(
    State(state): State<SharedState>,
    Json(payload): Json<RouteRequest>,
) -> Json<RouteResponse> {
    let router = state.pipeline.router();
    let mut request = RoutingRequest::new(payload.skill.as_str())
        .with_context_tokens(payload.context_tokens)
        .streaming(payload.stream);
    if let Some(user) = payload.user_id {
        request = request.with_user(user);
    }
    let selected = router.select_provider(&request);

    Json(RouteResponse {
        skill: request.skill.to_string(),
        default_tier: router.default_tier(&request.skill),
        tier: selected.tier,
        model: selected.model,
        remote_available: router.remote_available(),
    })
}

#[derive(Deserialize)]
struct HistoryMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct GenerateRequest {
    skill: String,
    #[serde(default)]
    system_prompt: String,
    message: String,
    #[serde(default)]
    history: Vec<HistoryMessage>,
    /// Retrieval query; omitted ⇒ no retrieval
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    work: Option<String>,
    #[serde(default)]
    thematic_path: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

impl GenerateRequest {
    fn into_generation(self) -> GenerationRequest {
        let history = self
            .history
            .into_iter()
            .map(|m| match m.role.as_str() {
                "assistant" => Message::assistant(m.content),
                "system" => Message::system(m.content),
                _ => Message::user(m.content),
            })
            .collect();

        let mut request = GenerationRequest::new(self.skill, self.system_prompt, self.message)
            .with_history(history);
        if let Some(query) = self.query {
            let hint = ContextHint {
                work: self.work,
                thematic_path: self.thematic_path,
            };
            request = request.with_retrieval(query, (!hint.is_empty()).then_some(hint));
        }
        if let Some(user) = self.user_id {
            request = request.with_user(user);
        }
        request
    }
}

#[derive(Serialize)]
struct GenerateResponse {
    response: String,
    tier: Tier,
    model: String,
    usage: Option<Usage>,
    failed_attempts: Vec<AttemptRecord>,
    context: AssemblyMetadata,
    sources: Vec<SourceDto>,
}

#[derive(Serialize)]
struct SourceDto {
    document_id: String,
    title: String,
    score: f32,
}

async fn generate_handler(
    State(state): State<SharedState>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let request = payload.into_generation();
    info!(skill = %request.skill, "v1/generate request");

    let outcome = state
        .pipeline
        .generate(&request)
        .await
        .map_err(pipeline_error)?;

    Ok(Json(GenerateResponse {
        response: outcome.response.message.content,
        tier: outcome.tier,
        model: outcome.model,
        usage: outcome.response.usage,
        failed_attempts: outcome.attempts,
        context: outcome.context,
        sources: outcome
            .passages
            .iter()
            .map(|p| SourceDto {
                document_id: p.document_id.clone(),
                title: p.title.clone(),
                score: p.score,
            })
            .collect(),
    }))
}

/// `POST /v1/generate/stream`: a `route` event naming the serving tier,
/// then one `chunk` event per adapter chunk, or `error` if the stream breaks.
async fn generate_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let request = payload.into_generation();
    info!(skill = %request.skill, "v1/generate/stream request");

    let streaming = state
        .pipeline
        .stream(&request)
        .await
        .map_err(pipeline_error)?;

    let route = serde_json::json!({
        "tier": streaming.tier,
        "model": streaming.model,
        "failed_attempts": streaming.attempts,
    });
    let first = SseEvent::default().event("route").data(route.to_string());

    let chunks = futures::stream::unfold(streaming.receiver, |mut rx| async move {
        let event = match rx.recv().await? {
            Ok(chunk) => SseEvent::default()
                .event("chunk")
                .data(serde_json::to_string(&chunk).unwrap_or_default()),
            Err(e) => SseEvent::default().event("error").data(e.to_string()),
        };
        Some((Ok(event), rx))
    });

    let stream = futures::StreamExt::chain(futures::stream::once(async move { Ok(first) }), chunks);
    Ok(Sse::new(stream))
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    work: Option<String>,
    #[serde(default)]
    thematic_path: Option<String>,
}

fn default_limit() -> usize {
    10
}

#[derive(Serialize)]
struct SearchResponse {
    mode: &'static str,
    results: Vec<RetrievalChunk>,
}

async fn search_handler(
    State(state): State<SharedState>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let retriever = state.pipeline.retriever().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "No corpus loaded, set retrieval.corpus_path",
        )
    })?;

    let hint = ContextHint {
        work: payload.work,
        thematic_path: payload.thematic_path,
    };
    let (results, mode) = retriever
        .search_with_mode(&payload.query, payload.limit, Some(&hint))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(SearchResponse {
        mode: match mode {
            RetrievalMode::Hybrid => "hybrid",
            RetrievalMode::LexicalOnly => "lexical_only",
        },
        results,
    }))
}

#[derive(Serialize)]
struct CircuitsResponse {
    threshold: u32,
    circuits: Vec<CircuitSnapshot>,
}

async fn circuits_handler(State(state): State<SharedState>) -> Json<CircuitsResponse> {
    let breakers = state.pipeline.router().breakers();
    Json(CircuitsResponse {
        threshold: breakers.threshold(),
        circuits: breakers.snapshot(),
    })
}

fn parse_remote_tier(name: &str) -> Result<Tier, ApiError> {
    let tier: Tier = name
        .parse()
        .map_err(|e: String| api_error(StatusCode::NOT_FOUND, e))?;
    if !tier.is_remote() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "the local tier has no circuit breaker",
        ));
    }
    Ok(tier)
}

#[derive(Deserialize)]
struct ResetQuery {
    #[serde(default)]
    tier: Option<String>,
}

async fn reset_circuits_handler(
    State(state): State<SharedState>,
    Query(query): Query<ResetQuery>,
) -> Result<Json<CircuitsResponse>, ApiError> {
    let router = state.pipeline.router();
    match query.tier.as_deref() {
        Some(name) => {
            let tier = parse_remote_tier(name)?;
            router.breakers().reset(tier);
            info!(tier = %tier, "Circuit reset via API");
        }
        None => router.reset_circuits(),
    }
    Ok(circuits_handler(State(state)).await)
}

#[derive(Deserialize)]
struct ReportRequest {
    success: bool,
}

async fn report_handler(
    State(state): State<SharedState>,
    Path(tier): Path<String>,
    Json(payload): Json<ReportRequest>,
) -> Result<Json<CircuitSnapshot>, ApiError> {
    let tier = parse_remote_tier(&tier)?;
    let router = state.pipeline.router();
    if payload.success {
        router.record_success(tier);
    } else {
        router.record_error(tier);
    }

    router
        .breakers()
        .snapshot()
        .into_iter()
        .find(|s| s.tier == tier)
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("no circuit for tier '{tier}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use tierwise_core::error::ProviderError;
    use tierwise_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use tierwise_core::retrieval::{AuthorityLevel, Document, SourceMetadata};
    use tierwise_core::tier::TierTable;
    use tierwise_engine::PipelineSettings;
    use tierwise_providers::{CircuitBreakerRegistry, TierRouter};
    use tierwise_retrieval::{HybridRetriever, RetrievalSettings};

    /// Lightweight mock provider for gateway tests.
    struct MockProvider {
        name: &'static str,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            if self.fail {
                return Err(ProviderError::Network("connection reset".into()));
            }
            Ok(ProviderResponse {
                message: Message::assistant(format!("reply from {}", self.name)),
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                model: request.model,
            })
        }
    }

    fn mock(name: &'static str, fail: bool) -> Arc<dyn Provider> {
        Arc::new(MockProvider { name, fail })
    }

    fn corpus() -> HybridRetriever {
        let doc = Document {
            id: "moliere-tartuffe".into(),
            title: "Tartuffe".into(),
            tags: vec!["comédie".into()],
            excerpt: String::new(),
            content: "Molière dénonce l'hypocrisie religieuse.".into(),
            authority: AuthorityLevel::A,
            metadata: SourceMetadata {
                work: Some("Tartuffe".into()),
                thematic_path: Some("theatre/comedie".into()),
            },
            embedding: None,
        };
        HybridRetriever::from_documents(vec![doc], None, RetrievalSettings::default()).unwrap()
    }

    fn test_state(reasoning_fails: bool, admin_token: Option<&str>) -> SharedState {
        let router = TierRouter::new(
            TierTable::default(),
            Arc::new(CircuitBreakerRegistry::new()),
            mock("local", false),
        )
        .register(Tier::Reasoning, mock("reasoning", reasoning_fails))
        .register(Tier::Large, mock("large", false))
        .register(Tier::Standard, mock("standard", false))
        .register(Tier::Micro, mock("micro", false));

        let pipeline = GenerationPipeline::new(
            Arc::new(router),
            Some(Arc::new(corpus())),
            PipelineSettings::default(),
        );
        Arc::new(GatewayState::new(
            Arc::new(pipeline),
            admin_token.map(String::from),
        ))
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state(false, None));
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, json) = send(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["remote_available"], true);
        assert_eq!(json["retrieval"], true);
    }

    #[tokio::test]
    async fn route_selects_tier_for_skill() {
        let app = build_router(test_state(false, None));
        let (status, json) = send(
            app,
            post_json("/v1/route", serde_json::json!({"skill": "titreur", "context_tokens": 50})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tier"], "micro");
        assert_eq!(json["default_tier"], "micro");
        assert_eq!(json["model"], "google/gemini-2.5-flash-lite");
    }

    #[tokio::test]
    async fn route_degrades_oversized_context() {
        let app = build_router(test_state(false, None));
        let (_, json) = send(
            app,
            post_json(
                "/v1/route",
                serde_json::json!({"skill": "correcteur", "context_tokens": 150_000}),
            ),
        )
        .await;
        assert_eq!(json["default_tier"], "reasoning");
        assert_eq!(json["tier"], "large");
    }

    #[tokio::test]
    async fn generate_falls_back_and_reports_attempts() {
        let state = test_state(true, None);
        let app = build_router(state.clone());
        let (status, json) = send(
            app,
            post_json(
                "/v1/generate",
                serde_json::json!({
                    "skill": "jury",
                    "system_prompt": "Tu es un jury.",
                    "message": "Parlez-moi de Tartuffe.",
                    "query": "Tartuffe hypocrisie"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tier"], "large");
        assert_eq!(json["response"], "reply from large");
        assert_eq!(json["failed_attempts"][0]["tier"], "reasoning");
        assert_eq!(json["sources"][0]["document_id"], "moliere-tartuffe");
        assert_eq!(json["context"]["tier"], "large");
        assert_eq!(
            state.pipeline.router().breakers().failures(Tier::Reasoning),
            1
        );
    }

    #[tokio::test]
    async fn search_returns_ranked_chunks() {
        let app = build_router(test_state(false, None));
        let (status, json) = send(
            app,
            post_json(
                "/v1/search",
                serde_json::json!({"query": "hypocrisie", "work": "tartuffe"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["mode"], "lexical_only");
        assert_eq!(json["results"][0]["document_id"], "moliere-tartuffe");
    }

    #[tokio::test]
    async fn report_opens_circuit_after_threshold() {
        let state = test_state(false, None);
        for _ in 0..3 {
            let (status, _) = send(
                build_router(state.clone()),
                post_json("/v1/circuits/standard/report", serde_json::json!({"success": false})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let req = Request::builder().uri("/v1/circuits").body(Body::empty()).unwrap();
        let (_, json) = send(build_router(state.clone()), req).await;
        let standard = json["circuits"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["tier"] == "standard")
            .cloned()
            .unwrap();
        assert_eq!(standard["open"], true);
        assert_eq!(standard["consecutive_failures"], 3);

        let (_, json) = send(
            build_router(state),
            post_json("/v1/route", serde_json::json!({"skill": "chat"})),
        )
        .await;
        assert_eq!(json["tier"], "micro");
    }

    #[tokio::test]
    async fn report_rejects_unknown_and_local_tiers() {
        let state = test_state(false, None);
        let (status, _) = send(
            build_router(state.clone()),
            post_json("/v1/circuits/huge/report", serde_json::json!({"success": true})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            build_router(state),
            post_json("/v1/circuits/local/report", serde_json::json!({"success": true})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reset_requires_admin_token_when_configured() {
        let state = test_state(false, Some("s3cret"));
        for _ in 0..3 {
            state.pipeline.router().record_error(Tier::Large);
        }

        let req = Request::builder()
            .method("POST")
            .uri("/v1/circuits/reset")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(build_router(state.clone()), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(state.pipeline.router().breakers().is_open(Tier::Large));

        let req = Request::builder()
            .method("POST")
            .uri("/v1/circuits/reset?tier=large")
            .header("Authorization", "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(build_router(state.clone()), req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!state.pipeline.router().breakers().is_open(Tier::Large));
    }

    #[tokio::test]
    async fn reset_all_without_token_configured() {
        let state = test_state(false, None);
        state.pipeline.router().record_error(Tier::Micro);
        let req = Request::builder()
            .method("POST")
            .uri("/v1/circuits/reset")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(build_router(state.clone()), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["threshold"], 3);
        assert_eq!(state.pipeline.router().breakers().failures(Tier::Micro), 0);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = build_router(test_state(false, None));
        let huge = "x".repeat(MAX_BODY_BYTES + 1);
        let (status, _) = send(
            app,
            post_json("/v1/search", serde_json::json!({"query": huge})),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn pipeline_errors_map_to_status_codes() {
        let (status, Json(body)) = pipeline_error(
            ProviderError::Timeout("reasoning after 120s".into()).into(),
        );
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.error.contains("reasoning"));

        let (status, _) = pipeline_error(
            tierwise_core::error::RetrievalError::MalformedIndex("duplicate id".into()).into(),
        );
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
