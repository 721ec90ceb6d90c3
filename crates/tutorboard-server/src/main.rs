//! Tutorboard Development Sandbox Server
//!
//! Stands in for the sandbox launcher during local development. Every
//! whiteboard session gets one sandbox URL; the sandbox reports itself
//! healthy once a configurable warm-up has passed.
//!
//! ## Endpoints
//!
//! ```text
//! POST /api/sandboxes              { "sessionId": "..." } -> { "url": "..." }
//! GET  /api/sandboxes/{sessionId}  -> { "id": "...", "sandboxUrl": "..." }
//! GET  /sandboxes/{id}/api/health  -> { "ok": bool }
//! GET  /api/health                 -> { "ok": true }
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tutorboard_core::session::SessionRecord;
use uuid::Uuid;

const DEFAULT_ADDR: &str = "0.0.0.0:3040";
const DEFAULT_PUBLIC_URL: &str = "http://localhost:3040";

#[derive(Debug, Error)]
enum ConfigError {
    #[error("Invalid {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Server configuration, read from `TUTORBOARD_*` environment variables.
#[derive(Debug, Clone)]
struct ServerConfig {
    addr: SocketAddr,
    public_url: String,
    warmup: Duration,
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let addr = lookup("TUTORBOARD_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr = addr.parse().map_err(|_| ConfigError::Invalid {
            var: "TUTORBOARD_ADDR",
            value: addr.clone(),
        })?;

        let public_url = lookup("TUTORBOARD_PUBLIC_URL")
            .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let warmup = match lookup("TUTORBOARD_WARMUP_MS") {
            Some(value) => Duration::from_millis(value.parse().map_err(|_| ConfigError::Invalid {
                var: "TUTORBOARD_WARMUP_MS",
                value: value.clone(),
            })?),
            None => Duration::ZERO,
        };

        Ok(Self {
            addr,
            public_url,
            warmup,
        })
    }
}

#[derive(Debug, Error)]
enum ApiError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(&'static str),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LaunchRequest {
    session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LaunchResponse {
    url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct HealthBody {
    ok: bool,
}

/// A launched sandbox
struct Sandbox {
    id: String,
    record: SessionRecord,
    launched_at: Instant,
}

/// Shared application state
struct AppState {
    config: ServerConfig,
    /// Sandboxes by session id
    sandboxes: DashMap<String, Sandbox>,
}

impl AppState {
    fn new(config: ServerConfig) -> Self {
        Self {
            config,
            sandboxes: DashMap::new(),
        }
    }

    /// Sandbox URL for a session, launching one on first request.
    fn launch(&self, session_id: &str) -> String {
        let sandbox = self.sandboxes.entry(session_id.to_string()).or_insert_with(|| {
            let id = Uuid::new_v4().to_string();
            let url = format!("{}/sandboxes/{}", self.config.public_url, id);
            info!("Launched sandbox {} for session {}", id, session_id);
            Sandbox {
                id,
                record: SessionRecord::new(session_id).with_sandbox_url(url),
                launched_at: Instant::now(),
            }
        });
        sandbox.record.sandbox_url.clone().unwrap_or_default()
    }

    fn is_warm(&self, sandbox_id: &str) -> bool {
        self.sandboxes
            .iter()
            .find(|entry| entry.id == sandbox_id)
            .is_some_and(|entry| entry.launched_at.elapsed() >= self.config.warmup)
    }
}

fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/sandboxes", post(launch_sandbox))
        .route("/api/sandboxes/{session_id}", get(get_sandbox))
        .route("/sandboxes/{sandbox_id}/api/health", get(sandbox_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutorboard_server=info,tower_http=info".into()),
        )
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };
    let addr = config.addr;
    info!("Tutorboard sandbox server listening on {}", addr);
    info!("Sandbox URLs are published under {}", config.public_url);

    let app = create_router(Arc::new(AppState::new(config)));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}

/// Index page
async fn index() -> &'static str {
    "Tutorboard Sandbox Server - POST /api/sandboxes to launch a sandbox"
}

/// Health of the server itself
async fn health() -> Json<HealthBody> {
    Json(HealthBody { ok: true })
}

async fn launch_sandbox(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LaunchRequest>,
) -> Result<Json<LaunchResponse>, ApiError> {
    if request.session_id.is_empty() {
        return Err(ApiError::BadRequest("sessionId must not be empty"));
    }
    let url = state.launch(&request.session_id);
    Ok(Json(LaunchResponse { url }))
}

async fn get_sandbox(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionRecord>, ApiError> {
    state
        .sandboxes
        .get(&session_id)
        .map(|sandbox| Json(sandbox.record.clone()))
        .ok_or(ApiError::NotFound(session_id))
}

/// Health of one sandbox; not ready until the warm-up has passed
async fn sandbox_health(
    State(state): State<Arc<AppState>>,
    Path(sandbox_id): Path<String>,
) -> Json<HealthBody> {
    Json(HealthBody {
        ok: state.is_warm(&sandbox_id),
    })
}
