//! HTTP API gateway for SpurChat.
//!
//! Exposes the chat endpoints and a health check.
//!
//! Built on Axum for high performance async HTTP.

pub mod chat_api;

use axum::extract::{ConnectInfo, DefaultBodyLimit};
use axum::{
    Router,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use spurchat_chat::ChatService;
use spurchat_config::{AppConfig, GatewayConfig, StoreConfig};
use spurchat_core::error::StoreError;
use spurchat_core::store::SessionStore;
use spurchat_store::{InMemoryStore, SqliteStore};

use chat_api::ErrorResponse;

/// Body returned with 429.
pub const RATE_LIMITED: &str = "Too many messages, please try again later.";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub chat: Arc<ChatService>,
}

impl GatewayState {
    pub fn new(chat: Arc<ChatService>) -> Arc<Self> {
        Arc::new(Self { chat })
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - per-client rate limiting on `POST /chat/message`
/// - request body size limit
/// - CORS (any origin unless `allowed_origins` is set)
/// - HTTP trace logging
pub fn build_router(state: SharedState, config: &GatewayConfig) -> Router {
    let mut messages = chat_api::message_routes();
    if config.rate_limit_per_minute > 0 {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_per_minute,
            Duration::from_secs(60),
            config.trust_forwarded_for,
        ));
        messages = messages.route_layer(middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            rate_limit_middleware(limiter, req, next)
        }));
    }

    let chat = messages.merge(chat_api::history_routes());

    Router::new()
        .route("/health", get(health_handler))
        .nest("/chat", chat)
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(cors_layer(&config.allowed_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    if allowed_origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(origins))
}

/// Open the configured session store, creating the database directory if needed.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn SessionStore>, StoreError> {
    match config.backend.as_str() {
        "memory" => {
            warn!("Using in-memory store; conversations are lost on restart");
            Ok(Arc::new(InMemoryStore::new()))
        }
        _ => {
            if let Some(parent) = std::path::Path::new(&config.path).parent() {
                if !parent.as_os_str().is_empty() && !config.path.contains(":memory:") {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Storage(format!("Cannot create {}: {e}", parent.display()))
                    })?;
                }
            }
            Ok(Arc::new(SqliteStore::new(&config.path).await?))
        }
    }
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    if !config.has_api_key() {
        warn!(
            provider = %config.default_provider,
            "No API key configured; every reply will be the fallback message"
        );
    }

    let store = open_store(&config.store).await?;
    let provider = spurchat_providers::build_from_config(&config)
        .default()
        .ok_or("No default provider configured")?;

    info!(
        provider = %provider.name(),
        model = %config.default_model,
        store = %store.name(),
        "Chat service ready"
    );

    let chat = Arc::new(ChatService::from_config(&config, store, provider));
    let app = build_router(GatewayState::new(chat), &config.gateway);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// --- Rate Limiter ---

/// Simple in-memory sliding-window rate limiter.
///
/// Tracks request timestamps per client key (peer IP, or the forwarded
/// address when running behind a trusted proxy).
/// Thread-safe via `std::sync::Mutex` (non-async, held briefly).
struct RateLimiter {
    max_requests: usize,
    window: Duration,
    trust_forwarded_for: bool,
    clients: std::sync::Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration, trust_forwarded_for: bool) -> Self {
        Self {
            max_requests,
            window,
            trust_forwarded_for,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Check if the client is within rate limits. Returns `true` if allowed.
    fn check(&self, client_key: &str) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        // Periodic cleanup: if map grows too large, evict stale entries
        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

/// The peer IP, else "anonymous". With `trust_forwarded_for` the first hop
/// of `X-Forwarded-For` takes precedence; clients can set that header freely,
/// so it only counts when a proxy in front of us overwrites it.
fn client_key(req: &axum::extract::Request, trust_forwarded_for: bool) -> String {
    let forwarded = trust_forwarded_for
        .then(|| req.headers().get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(forwarded) = forwarded {
        return forwarded.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Returns 429 with a JSON error body once a client exceeds its budget.
async fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
    req: axum::extract::Request,
    next: Next,
) -> Response {
    let client = client_key(&req, limiter.trust_forwarded_for);

    if !limiter.check(&client) {
        warn!(client = %client, "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                error: RATE_LIMITED.into(),
            }),
        )
            .into_response();
    }

    next.run(req).await
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
