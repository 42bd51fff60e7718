//! HTTP routes of the AI call path.
//!
//! Every route expects the authentication middleware to have inserted a
//! [`ClientIdentity`]; the plan always comes from there, never from the body.

use std::{str::FromStr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Extension, Path, State, rejection::JsonRejection},
    response::{IntoResponse, Response},
    routing::post,
};
use config::{Config, ProviderKind};
use context::ClientIdentity;
use jiff::Timestamp;
use rate_limit::{DailyQuota, DailyQuotaOutcome};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use store::{AnalyticsSink, UsageEvent, UsageSource};
use strum::IntoEnumIterator;

use crate::{
    error::LlmError,
    keys::ServerKeys,
    managed::ManagedApiService,
    messages::{CallOptions, ChatMessage, ManagedApiResponse, Prompt, Usage},
    policy::CallPolicy,
    provider::ProviderAdapter,
    registry::ProviderRegistry,
};

/// Collaborators of the AI routes.
pub struct AiServices {
    pub registry: Arc<ProviderRegistry>,
    pub managed: Arc<ManagedApiService>,
    pub daily_quota: Arc<DailyQuota>,
    pub server_keys: Arc<ServerKeys>,
    pub analytics: Arc<dyn AnalyticsSink>,
}

struct AiState {
    config: Arc<Config>,
    services: AiServices,
    policy: CallPolicy,
}

impl AiState {
    fn fail(&self, error: LlmError) -> Response {
        error.to_response(self.config.server.development)
    }
}

/// Creates the router of the AI endpoints and the legacy per-vendor proxies.
pub fn router(config: Arc<Config>, services: AiServices) -> Router {
    let state = Arc::new(AiState {
        policy: CallPolicy::new(config.http),
        config,
        services,
    });

    let mut router = Router::new()
        .route("/api/ai/chat", post(chat))
        .route("/api/ai/call", post(managed_call))
        .route("/api/ai/proxy/{provider}", post(proxy));

    for kind in ProviderKind::iter() {
        router = router.route(
            &kind.legacy_proxy_route(),
            post(
                move |State(state): State<Arc<AiState>>,
                      identity: Option<Extension<ClientIdentity>>,
                      body: Result<Json<Value>, JsonRejection>| async move {
                    match legacy_proxy(&state, kind, identity, body).await {
                        Ok(response) => response.into_response(),
                        Err(e) => state.fail(e),
                    }
                },
            ),
        );
    }

    router.with_state(state)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    provider: String,
    messages: Vec<ChatMessage>,
    model: Option<String>,
    #[serde(default)]
    options: ChatOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatOptions {
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl ChatRequest {
    fn validate(&self) -> crate::Result<()> {
        if self.provider.trim().is_empty() {
            return Err(LlmError::InvalidRequest("Validation error: provider is required".to_string()));
        }

        if self.messages.is_empty() {
            return Err(LlmError::InvalidRequest(
                "Validation error: messages must contain at least one message".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    success: bool,
    response: String,
    usage: Usage,
}

/// Quota-enforced chat completion with the server's own keys.
async fn chat(
    State(state): State<Arc<AiState>>,
    identity: Option<Extension<ClientIdentity>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    match handle_chat(&state, identity, body).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => state.fail(e),
    }
}

async fn handle_chat(
    state: &AiState,
    identity: Option<Extension<ClientIdentity>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> crate::Result<ChatResponse> {
    let Json(request) = body.map_err(invalid_body)?;
    request.validate()?;

    let Some(Extension(identity)) = identity else {
        return Err(LlmError::Unauthenticated);
    };

    let plan = state.config.plans.resolve(&identity.plan);
    ensure_entitled(state, &identity, &request.provider)?;

    let (kind, adapter) = lookup(state, &request.provider)?;

    match state
        .services
        .daily_quota
        .check(&identity.user_id, plan.config.requests_per_day)
        .await?
    {
        DailyQuotaOutcome::Exceeded { limit, reset_at } => {
            return Err(LlmError::DailyQuotaExceeded { limit, reset_at });
        }
        DailyQuotaOutcome::Allowed { used, limit } => {
            log::debug!("User {} used {used} of {limit} daily requests", identity.user_id);
        }
        DailyQuotaOutcome::Unlimited => (),
    }

    let api_key = server_key(state, kind).await?;

    let Some(defaults) = state.config.model_defaults(plan.id, kind) else {
        return Err(LlmError::NotConfiguredForPlan {
            provider: kind.name().to_string(),
            plan: plan.id.to_string(),
        });
    };

    let options = CallOptions {
        provider: kind.name().to_string(),
        model: request.model,
        input: Prompt::Messages(request.messages),
        max_tokens: request.options.max_tokens,
        temperature: request.options.temperature,
        user_id: identity.user_id.clone(),
        plan_id: plan.id.to_string(),
    };

    let reply = state
        .policy
        .run(adapter.name(), || adapter.call(&api_key, &options, &defaults))
        .await?;

    let event = UsageEvent {
        user_id: identity.user_id.clone(),
        provider: kind.name().to_string(),
        model: options
            .model
            .clone()
            .filter(|model| !model.is_empty())
            .unwrap_or(defaults.model),
        tokens_used: reply.tokens_used(&options.input),
        source: UsageSource::Chat,
        timestamp: Timestamp::now(),
    };

    if let Err(e) = state.services.analytics.record(event).await {
        log::warn!("Failed to record chat usage for user {}: {e}", identity.user_id);
    }

    Ok(ChatResponse {
        success: true,
        response: reply.content,
        usage: reply.usage,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagedCallRequest {
    provider: String,
    model: Option<String>,
    prompt: Option<String>,
    messages: Option<Vec<ChatMessage>>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl ManagedCallRequest {
    fn into_options(self, identity: &ClientIdentity) -> crate::Result<CallOptions> {
        let input = match (self.messages, self.prompt) {
            (Some(messages), _) if !messages.is_empty() => Prompt::Messages(messages),
            (_, Some(prompt)) if !prompt.is_empty() => Prompt::Text(prompt),
            _ => {
                return Err(LlmError::InvalidRequest(
                    "Validation error: prompt or messages is required".to_string(),
                ));
            }
        };

        Ok(CallOptions {
            provider: self.provider,
            model: self.model,
            input,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            user_id: identity.user_id.clone(),
            plan_id: identity.plan.clone(),
        })
    }
}

/// The managed call path over HTTP. Always answers in the managed response shape.
async fn managed_call(
    State(state): State<Arc<AiState>>,
    identity: Option<Extension<ClientIdentity>>,
    body: Result<Json<ManagedCallRequest>, JsonRejection>,
) -> Response {
    let result = match (identity, body) {
        (None, _) => Err(LlmError::Unauthenticated),
        (_, Err(rejection)) => Err(invalid_body(rejection)),
        (Some(Extension(identity)), Ok(Json(request))) => match request.into_options(&identity) {
            Ok(options) => state.services.managed.call(&options).await,
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(call) => Json(ManagedApiResponse::success(call.reply, call.tokens_used)).into_response(),
        Err(e) => {
            let status = e.status_code();
            (status, Json(ManagedApiResponse::failure(e.client_message()))).into_response()
        }
    }
}

/// Passthrough to any entitled vendor with the server's key. No quota is counted.
async fn proxy(
    State(state): State<Arc<AiState>>,
    Path(provider): Path<String>,
    identity: Option<Extension<ClientIdentity>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let result: crate::Result<Value> = async {
        let Json(body) = body.map_err(invalid_body)?;

        let Some(Extension(identity)) = identity else {
            return Err(LlmError::Unauthenticated);
        };

        ensure_entitled(&state, &identity, &provider)?;

        let (kind, adapter) = lookup(&state, &provider)?;
        forward(&state, kind, adapter, body).await
    }
    .await;

    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => state.fail(e),
    }
}

/// `/<vendor>Proxy`: authenticated passthrough without quota or plan checks.
async fn legacy_proxy(
    state: &AiState,
    kind: ProviderKind,
    identity: Option<Extension<ClientIdentity>>,
    body: Result<Json<Value>, JsonRejection>,
) -> crate::Result<Json<Value>> {
    let Json(body) = body.map_err(invalid_body)?;

    let Some(Extension(identity)) = identity else {
        return Err(LlmError::Unauthenticated);
    };

    log::debug!("Legacy {kind} proxy call for user {}", identity.user_id);

    let (kind, adapter) = lookup(state, kind.name())?;

    forward(state, kind, adapter, body).await.map(Json)
}

async fn forward(
    state: &AiState,
    kind: ProviderKind,
    adapter: Arc<dyn ProviderAdapter>,
    body: Value,
) -> crate::Result<Value> {
    let api_key = server_key(state, kind).await?;

    state
        .policy
        .run(adapter.name(), || adapter.forward(&api_key, body.clone()))
        .await
}

fn ensure_entitled(state: &AiState, identity: &ClientIdentity, provider: &str) -> crate::Result<()> {
    if state.config.plans.can_use_provider(&identity.plan, provider) {
        return Ok(());
    }

    let plan = state.config.plans.resolve(&identity.plan);

    Err(LlmError::NotEntitled {
        provider: provider.to_string(),
        plan: plan.id.to_string(),
        allowed: plan.config.providers.names(),
    })
}

fn lookup(state: &AiState, provider: &str) -> crate::Result<(ProviderKind, Arc<dyn ProviderAdapter>)> {
    let unsupported = || LlmError::UnsupportedProvider(provider.to_string());

    let kind = ProviderKind::from_str(provider).map_err(|_| unsupported())?;
    let adapter = state.services.registry.get(kind.name()).ok_or_else(unsupported)?;

    Ok((kind, adapter))
}

async fn server_key(state: &AiState, kind: ProviderKind) -> crate::Result<SecretString> {
    state
        .services
        .server_keys
        .select(kind, None)
        .await?
        .ok_or_else(|| LlmError::ProviderNotConfigured(kind.name().to_string()))
}

fn invalid_body(rejection: JsonRejection) -> LlmError {
    LlmError::InvalidRequest(format!("Validation error: {}", rejection.body_text()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
    };
    use config::Config;
    use context::ClientIdentity;
    use indoc::formatdoc;
    use rate_limit::{
        DailyQuota, InMemoryDailyQuota, InMemoryRateLimitStore, RateLimitService, SystemClock,
    };
    use serde_json::{Value, json};
    use store::{InMemoryAnalytics, InMemoryManagedKeyPool, UsageSource};
    use tower::ServiceExt;

    use super::{AiServices, router};
    use crate::{
        keys::{InMemoryOwnKeys, KeyResolver, ServerKeys},
        managed::ManagedApiService,
        registry::ProviderRegistry,
        test_support::{MockVendor, mock_vendor},
    };

    struct TestApp {
        router: Router,
        analytics: Arc<InMemoryAnalytics>,
        vendor: MockVendor,
    }

    impl TestApp {
        async fn post(&self, path: &str, identity: Option<ClientIdentity>, body: Value) -> (StatusCode, Value) {
            let mut request = Request::builder()
                .method("POST")
                .uri(path)
                .header("content-type", "application/json");

            if let Some(identity) = identity {
                request = request.extension(identity);
            }

            let request = request.body(Body::from(body.to_string())).unwrap();
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();

            (status, serde_json::from_slice(&bytes).unwrap())
        }
    }

    async fn app() -> TestApp {
        let vendor = mock_vendor(
            StatusCode::OK,
            json!({
                "choices": [{ "message": { "content": "Bonjour!" } }],
                "usage": { "prompt_tokens": 4, "completion_tokens": 2, "total_tokens": 6 }
            }),
        )
        .await;

        let config: Config = toml::from_str(&formatdoc! {r#"
            [plans.free]
            providers = ["mistral"]
            requests_per_day = 2
            requests_per_minute = 10

            [providers.mistral]
            api_key = "server-mistral"
            base_url = "{base_url}"
        "#, base_url = vendor.base_url()})
        .unwrap();

        let config = Arc::new(config);
        let clock = Arc::new(SystemClock);
        let registry = Arc::new(ProviderRegistry::from_config(&config).unwrap());
        let analytics = Arc::new(InMemoryAnalytics::new());

        let server_keys = Arc::new(ServerKeys::new(
            Arc::new(InMemoryManagedKeyPool::new()),
            config.providers.clone(),
        ));

        let managed = ManagedApiService::new(
            registry.clone(),
            Arc::new(RateLimitService::new(
                Arc::new(InMemoryRateLimitStore::new()),
                clock.clone(),
                config.plans.clone(),
            )),
            config.clone(),
            KeyResolver::new(Arc::new(InMemoryOwnKeys::new()), server_keys.clone()),
            analytics.clone(),
        );

        let services = AiServices {
            registry,
            managed: Arc::new(managed),
            daily_quota: Arc::new(DailyQuota::new(Arc::new(InMemoryDailyQuota::new()), clock)),
            server_keys,
            analytics: analytics.clone(),
        };

        TestApp {
            router: router(config, services),
            analytics,
            vendor,
        }
    }

    fn free_user() -> Option<ClientIdentity> {
        Some(ClientIdentity::free("user-1"))
    }

    fn pro_user() -> Option<ClientIdentity> {
        Some(ClientIdentity {
            plan: "pro".to_string(),
            subscription_active: true,
            ..ClientIdentity::free("user-2")
        })
    }

    fn chat_body(provider: &str) -> Value {
        json!({
            "provider": provider,
            "messages": [{ "role": "user", "content": "Salut" }],
            "options": { "temperature": 0.2, "maxTokens": 128 }
        })
    }

    #[tokio::test]
    async fn chat_answers_with_vendor_usage() {
        let app = app().await;

        let (status, body) = app.post("/api/ai/chat", free_user(), chat_body("mistral")).await;

        assert_eq!(status, StatusCode::OK);

        assert_eq!(
            body,
            json!({
                "success": true,
                "response": "Bonjour!",
                "usage": { "prompt_tokens": 4, "completion_tokens": 2, "total_tokens": 6 }
            })
        );

        let request = app.vendor.single_request();

        assert_eq!(request.path, "/chat/completions");
        assert_eq!(request.headers["authorization"], "Bearer server-mistral");
        assert_eq!(request.body["max_tokens"], 128);
        assert_eq!(request.body["model"], "mistral-medium");

        let events = app.analytics.events().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, UsageSource::Chat);
        assert_eq!(events[0].tokens_used, 6);
    }

    #[tokio::test]
    async fn chat_enforces_the_daily_quota() {
        let app = app().await;

        for _ in 0..2 {
            let (status, _) = app.post("/api/ai/chat", free_user(), chat_body("mistral")).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = app.post("/api/ai/chat", free_user(), chat_body("mistral")).await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Daily limit reached");
        assert_eq!(body["limit"], 2);
        assert!(body["resetAt"].as_str().unwrap().ends_with("T00:00:00Z"));
        assert_eq!(app.vendor.requests().len(), 2);
    }

    #[tokio::test]
    async fn chat_refuses_providers_outside_the_plan() {
        let app = app().await;

        let (status, body) = app.post("/api/ai/chat", free_user(), chat_body("claude")).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["allowedProviders"], json!(["mistral"]));
        assert!(app.vendor.requests().is_empty());
    }

    #[tokio::test]
    async fn chat_without_server_key() {
        let app = app().await;

        let (status, body) = app.post("/api/ai/chat", pro_user(), chat_body("openai")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Provider not configured");
    }

    #[tokio::test]
    async fn chat_validates_the_body() {
        let app = app().await;

        let (status, body) = app
            .post("/api/ai/chat", free_user(), json!({ "provider": "mistral", "messages": [] }))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "invalid_request_error");

        let (status, _) = app.post("/api/ai/chat", free_user(), json!({ "messages": [] })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_requires_an_identity() {
        let app = app().await;

        let (status, body) = app.post("/api/ai/chat", None, chat_body("mistral")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication required");
    }

    #[tokio::test]
    async fn unknown_provider_is_a_bad_request() {
        let app = app().await;

        let (status, body) = app.post("/api/ai/chat", pro_user(), chat_body("unknownvendor")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unsupported provider: unknownvendor");
    }

    #[tokio::test]
    async fn managed_call_route_uses_the_managed_shape() {
        let app = app().await;

        let (status, body) = app
            .post(
                "/api/ai/call",
                free_user(),
                json!({ "provider": "mistral", "prompt": "Salut", "plan": "enterprise" }),
            )
            .await;

        assert_eq!(status, StatusCode::OK);

        assert_eq!(
            body,
            json!({
                "success": true,
                "data": {
                    "content": "Bonjour!",
                    "usage": { "prompt_tokens": 4, "completion_tokens": 2, "total_tokens": 6 }
                },
                "tokensUsed": 6
            })
        );

        let (status, body) = app
            .post("/api/ai/call", free_user(), json!({ "provider": "unknownvendor", "prompt": "Salut" }))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "success": false, "error": "Unsupported provider: unknownvendor" }));
        assert_eq!(app.vendor.requests().len(), 1);
    }

    #[tokio::test]
    async fn legacy_proxy_skips_the_quota() {
        let app = app().await;
        let passthrough = json!({ "model": "mistral-small", "messages": [{ "role": "user", "content": "hi" }] });

        for _ in 0..3 {
            let (status, body) = app.post("/mistralProxy", free_user(), passthrough.clone()).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["choices"][0]["message"]["content"], "Bonjour!");
        }

        let requests = app.vendor.requests();

        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].body, passthrough);

        // The quota is still untouched.
        let (status, _) = app.post("/api/ai/chat", free_user(), chat_body("mistral")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn generic_proxy_checks_the_plan() {
        let app = app().await;
        let passthrough = json!({ "messages": [] });

        let (status, _) = app.post("/api/ai/proxy/claude", free_user(), passthrough.clone()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app.post("/api/ai/proxy/mistral", free_user(), passthrough).await;
        assert_eq!(status, StatusCode::OK);
    }
}
