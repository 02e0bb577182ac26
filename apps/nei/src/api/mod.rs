//! # nei HTTP API Module
//!
//! REST API over the run database, using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /runs` - List stored runs
//! - `GET /runs/{id}` - One run with its full record
//! - `DELETE /runs/{id}` - Delete a run
//! - `POST /simulate` - Run a simulation from a JSON run configuration and store it
//! - `POST /equilibrium` - Equilibrium ionic fractions
//! - `POST /shock` - Rankine-Hugoniot jump conditions
//! - `POST /runs/{id}/export` - Canonical export (base64) with checksum
//! - `GET /runs/{id}/hash` - BLAKE3 hash of the canonical export
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `NEI_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `NEI_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `NEI_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{API_KEY_ENV, get_api_key_from_env};
pub use handlers::{ApiError, MAX_API_STEPS};
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    EquilibriumRequest, EquilibriumResponse, ErrorResponse, ExportResponse, HashResponse,
    HealthResponse, RemoveResponse, RunResponse, RunsResponse, ShockRequest, ShockResponse,
    SimulateRequest, SimulateResponse,
};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use nei_core::{NeiError, RunStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted request body (2 MB).
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: the run database.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<RunStore>>,
}

impl AppState {
    #[must_use]
    pub fn new(store: RunStore) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

const ALLOWED_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

/// Build the CORS layer from `NEI_CORS_ORIGINS`.
///
/// - "*": all origins
/// - unset: localhost only
/// - otherwise: the comma-separated origins that parse
fn build_cors_layer() -> CorsLayer {
    match std::env::var("NEI_CORS_ORIGINS").ok().as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (NEI_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in NEI_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods(ALLOWED_METHODS)
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No NEI_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing
/// 2. CORS
/// 3. Body limit
/// 4. Rate Limiting (if enabled)
/// 5. Authentication (if configured)
pub fn create_router(state: AppState) -> Router {
    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set NEI_API_KEY to enable authentication."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/runs", get(handlers::list_runs_handler))
        .route(
            "/runs/{id}",
            get(handlers::get_run_handler).delete(handlers::remove_run_handler),
        )
        .route("/runs/{id}/export", post(handlers::export_handler))
        .route("/runs/{id}/hash", get(handlers::hash_handler))
        .route("/simulate", post(handlers::simulate_handler))
        .route("/equilibrium", post(handlers::equilibrium_handler))
        .route("/shock", post(handlers::shock_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer())
                .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_SIZE)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve the API on `addr` until interrupted.
pub async fn run_server(addr: &str, store: RunStore) -> Result<(), NeiError> {
    let router = create_router(AppState::new(store));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| NeiError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("nei HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| NeiError::IoError(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
