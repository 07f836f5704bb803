//! Spendlens Web Server
//!
//! Axum-based REST API over the analysis engine.
//!
//! - Session-scoped ledgers (JSON or CSV upload), held in memory
//! - Blocking analysis and Server-Sent Events progress streaming
//! - Question answering with optional Ollama narration
//! - Restrictive CORS policy and request tracing
//! - Sanitized error responses

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use spendlens_core::{AnalysisConfig, AnalysisEngine, AskRouter, Narrator, OllamaNarrator};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

mod handlers;
pub mod sessions;

pub use sessions::{SessionError, SessionStore};

/// Maximum upload size for ledgers (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Session timeout (30 minutes of inactivity)
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Maximum concurrent sessions before the oldest is evicted
pub const MAX_SESSIONS: usize = 50;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    pub session_timeout: Duration,
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            session_timeout: SESSION_TIMEOUT,
            max_sessions: MAX_SESSIONS,
        }
    }
}

impl ServerConfig {
    /// Defaults, with allowed origins from `SPENDLENS_ALLOWED_ORIGINS` (comma-separated)
    pub fn from_env() -> Self {
        let allowed_origins = std::env::var("SPENDLENS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            allowed_origins,
            ..Self::default()
        }
    }
}

/// Shared application state
pub struct AppState {
    pub engine: AnalysisEngine,
    pub ask_router: AskRouter,
    pub sessions: SessionStore,
    /// Narration backend, when one is configured
    pub narrator: Option<Arc<dyn Narrator>>,
}

/// Create the application router
pub fn create_router(analysis: AnalysisConfig, config: ServerConfig) -> Router {
    let narrator = OllamaNarrator::from_env().map(|ollama| {
        info!(model = %ollama.model(), "Narration backend configured");
        Arc::new(ollama) as Arc<dyn Narrator>
    });
    if narrator.is_none() {
        info!("ℹ️  Narration not configured (set OLLAMA_HOST to enable)");
    }
    create_router_with_options(analysis, config, narrator)
}

/// Create the application router with an explicit narrator (for testing)
pub fn create_router_with_options(
    analysis: AnalysisConfig,
    config: ServerConfig,
    narrator: Option<Arc<dyn Narrator>>,
) -> Router {
    let state = Arc::new(AppState {
        ask_router: AskRouter::new(&analysis),
        engine: AnalysisEngine::new(analysis),
        sessions: SessionStore::new(config.session_timeout, config.max_sessions),
        narrator,
    });

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        // Sessions
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/csv", post(handlers::create_session_csv))
        .route(
            "/sessions/:id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        // Analysis
        .route("/sessions/:id/analyze", post(handlers::analyze_session))
        .route("/sessions/:id/analyze/stream", get(handlers::stream_session))
        // Questions
        .route("/sessions/:id/ask", post(handlers::ask_session));

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the server
pub async fn serve(analysis: AnalysisConfig, host: &str, port: u16) -> anyhow::Result<()> {
    serve_with_config(analysis, host, port, ServerConfig::default()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    analysis: AnalysisConfig,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    let app = create_router(analysis, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn gone(msg: &str) -> Self {
        Self {
            status: StatusCode::GONE,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
