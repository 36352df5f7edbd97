//! HTTP API
//!
//! Thin axum layer over the orchestrator: decode the wire shape, enforce
//! request-level limits, delegate, encode. The wire contract is camelCase
//! JSON throughout.
//!
//! Endpoints:
//!   POST /api/moderate/url    { url, deviceId }
//!   POST /api/moderate/text   { text, url?, deviceId }
//!   POST /api/moderate/image  { imageUrls, url?, deviceId }
//!   POST /api/moderate/page   { url, text?, imageUrls?, deviceId }
//!   GET  /health

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use crate::cache::{MemoryTier, ResultCache, SqliteTier};
use crate::classify::{ImageClassifier, ModelClient, TextClassifier, UrlClassifier};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::orchestrator::{Orchestrator, PageRequest};
use crate::rate_limit::RateLimiter;
use crate::store::{SqliteActivityStore, SqliteProfileStore};

/// Text payloads above this are rejected outright rather than truncated.
const MAX_REQUEST_TEXT_LEN: usize = 50_000;

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            orchestrator,
            limiter,
        }
    }
}

// =============================================================================
// Wire shapes
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UrlCheckRequest {
    #[serde(default)]
    url: String,
    #[serde(default)]
    device_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextCheckRequest {
    #[serde(default)]
    text: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    device_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImagesCheckRequest {
    #[serde(default)]
    image_urls: Vec<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    device_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageCheckRequest {
    #[serde(default)]
    url: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    image_urls: Vec<String>,
    #[serde(default)]
    device_id: String,
}

// =============================================================================
// Request-level failures
// =============================================================================

enum ApiError {
    BadRequest(&'static str),
    RateLimited,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded"),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn throttle(state: &AppState, device_id: &str) -> Result<(), ApiError> {
    if state.limiter.check(device_id) {
        Ok(())
    } else {
        Err(ApiError::RateLimited)
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn check_url(
    State(state): State<AppState>,
    Json(request): Json<UrlCheckRequest>,
) -> Result<Response, ApiError> {
    if request.url.is_empty() {
        return Err(ApiError::BadRequest("url is required"));
    }
    throttle(&state, &request.device_id)?;

    let verdict = state
        .orchestrator
        .check_url(&request.url, &request.device_id)
        .await;
    Ok(Json(verdict).into_response())
}

async fn check_text(
    State(state): State<AppState>,
    Json(request): Json<TextCheckRequest>,
) -> Result<Response, ApiError> {
    if request.text.is_empty() {
        return Err(ApiError::BadRequest("text is required"));
    }
    if request.text.len() > MAX_REQUEST_TEXT_LEN {
        return Err(ApiError::BadRequest("text too large"));
    }
    throttle(&state, &request.device_id)?;

    let verdict = state
        .orchestrator
        .check_text(&request.text, &request.device_id, request.url.as_deref())
        .await;
    Ok(Json(verdict).into_response())
}

async fn check_images(
    State(state): State<AppState>,
    Json(request): Json<ImagesCheckRequest>,
) -> Result<Response, ApiError> {
    if request.image_urls.is_empty() {
        return Err(ApiError::BadRequest("imageUrls is required"));
    }
    throttle(&state, &request.device_id)?;

    let outcome = state
        .orchestrator
        .check_images(
            &request.image_urls,
            &request.device_id,
            request.url.as_deref(),
        )
        .await;
    Ok(Json(outcome).into_response())
}

async fn check_page(
    State(state): State<AppState>,
    Json(request): Json<PageCheckRequest>,
) -> Result<Response, ApiError> {
    if request.url.is_empty() {
        return Err(ApiError::BadRequest("url is required"));
    }
    if request.text.as_ref().is_some_and(|t| t.len() > MAX_REQUEST_TEXT_LEN) {
        return Err(ApiError::BadRequest("text too large"));
    }
    throttle(&state, &request.device_id)?;

    let outcome = state
        .orchestrator
        .check_page(PageRequest {
            url: request.url,
            text: request.text,
            image_urls: request.image_urls,
            device_id: request.device_id,
        })
        .await;
    Ok(Json(outcome).into_response())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Build the API router over prepared state.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/moderate/url", post(check_url))
        .route("/api/moderate/text", post(check_text))
        .route("/api/moderate/image", post(check_images))
        .route("/api/moderate/page", post(check_page))
        .route("/health", get(health))
        .with_state(state)
}

/// Wire the full gateway from config and serve until the process exits.
pub async fn serve(config: GatewayConfig) -> Result<(), GatewayError> {
    let profiles = Arc::new(
        SqliteProfileStore::open(&config.db_path).map_err(|e| GatewayError::Setup(e.to_string()))?,
    );
    let activity = Arc::new(
        SqliteActivityStore::open(&config.db_path)
            .map_err(|e| GatewayError::Setup(e.to_string()))?,
    );

    let fast = Arc::new(MemoryTier::new());
    // Detached on purpose; the reaper lives as long as the process.
    let _reaper = fast.spawn_reaper(Duration::from_secs(config.cache_reap_secs));
    let durable = Arc::new(
        SqliteTier::open(&config.db_path).map_err(|e| GatewayError::Setup(e.to_string()))?,
    );
    let cache = ResultCache::new(Some(fast), Some(durable));

    let client = Arc::new(ModelClient::new(&config));
    let orchestrator = Arc::new(Orchestrator::new(
        profiles,
        activity,
        cache,
        Arc::new(UrlClassifier::new(Arc::clone(&client), &config)),
        Arc::new(TextClassifier::new(Arc::clone(&client), &config)),
        Arc::new(ImageClassifier::new(client, &config)),
        &config,
    ));

    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_per_min,
        config.rate_limit_burst,
    ));
    // Same lifetime as the cache reaper: buckets for idle device ids must
    // not accumulate forever.
    let _limiter_reaper = limiter.spawn_reaper(Duration::from_secs(config.cache_reap_secs));
    let router = create_router(AppState::new(orchestrator, limiter));

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|source| GatewayError::Bind {
            addr: config.bind_addr.clone(),
            source,
        })?;
    info!(addr = %config.bind_addr, "moderation gateway listening");

    axum::serve(listener, router).await?;
    Ok(())
}
