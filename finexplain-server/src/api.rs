//! HTTP routes

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::HeaderValue,
    routing::{get, post},
    Json, Router,
};
use finexplain_core::{ask, Answer, Question, RuntimeStats, SamplingConfig, TextGenerator};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<dyn TextGenerator>,
    pub sampling: SamplingConfig,
    pub stats: Arc<RuntimeStats>,
    /// Caps generations in flight; a permit lives until the blocking task ends
    generation_slots: Option<Arc<Semaphore>>,
}

impl AppState {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        sampling: SamplingConfig,
        stats: Arc<RuntimeStats>,
    ) -> Self {
        Self {
            generator,
            sampling,
            stats,
            generation_slots: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub device: String,
}

/// Limits applied in front of the handlers; `None` disables a limit
#[derive(Debug, Clone, Default)]
pub struct RouterLimits {
    pub request_timeout: Option<Duration>,
    pub max_concurrency: Option<usize>,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.stats.model_id.clone(),
        device: state.stats.device.clone(),
    })
}

/// `POST /ask`. Always answers 200; generation failures are reported in the body.
async fn ask_question(
    State(state): State<AppState>,
    Json(question): Json<Question>,
) -> Json<Answer> {
    info!("Ask request: {} chars", question.user_q.len());
    debug!("Ask request: user_q='{}'", preview(&question.user_q));

    // Held by the blocking task, so a timed-out request still occupies its slot
    let permit = match &state.generation_slots {
        Some(slots) => match Arc::clone(slots).acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(e) => return Json(Answer::failure(e)),
        },
        None => None,
    };

    let generator = Arc::clone(&state.generator);
    let sampling = state.sampling;
    let answer = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        ask(&*generator, &sampling, &question)
    })
    .await
    .unwrap_or_else(|e| {
        warn!("Generation task did not complete: {}", e);
        Answer::failure(e)
    });

    Json(answer)
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(50) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// CORS for the configured browser origins, with credentials and any method/header
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("invalid CORS origin {origin:?}"))
        })
        .collect::<Result<Vec<_>>>()?;

    // Wildcards are not allowed together with credentials, so mirror the request instead
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

pub fn create_router(mut state: AppState, cors: CorsLayer, limits: &RouterLimits) -> Router {
    state.generation_slots = limits
        .max_concurrency
        .map(|limit| Arc::new(Semaphore::new(limit)));

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/ask", post(ask_question));

    if let Some(timeout) = limits.request_timeout {
        router = router.layer(TimeoutLayer::new(timeout));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
