//! idxmngr REST API
//!
//! HTTP API layer for the index manager, built with Axum.
//!
//! # Endpoints
//!
//! ## Index
//! - `POST /api/index/list` - List indexes, optionally per network
//! - `POST /api/index/info` - One index with its counters
//! - `POST /api/index/create` - Register an index
//!
//! ## Search
//! - `POST /api/index/search` - Comparison or range search, returns tx ids
//!
//! ## Insert
//! - `POST /api/index/insert` - Single record
//! - `POST /api/index/insert/batch` - Batch of records
//! - `GET /api/index/insert/stream` - WebSocket stream of batches
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! Read endpoints run under the request timeout. Writes are bounded by the
//! service's operation deadline instead, so a batch always reports what it
//! committed.
//!
//! # Example
//!
//! ```rust,ignore
//! use idxmngr::api::{serve, ApiConfig, AppState};
//! use idxmngr::keys::KeyEncoder;
//! use idxmngr::service::{IndexService, ServiceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = IndexService::open(ServiceConfig::new("./data"), KeyEncoder::with_defaults())?;
//!     let config = ApiConfig::default();
//!
//!     let state = AppState::new(Arc::new(service), config.clone());
//!     serve(state, &config).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::service::ServiceError;
use crate::stream::stream_insert_handler;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs.max(1));

    let read_routes = Router::new()
        .route("/list", post(routes::index::list_indexes))
        .route("/info", post(routes::index::index_info))
        .route("/search", post(routes::search::search_index))
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::map_response(move |response: Response| {
            request_timeout_response(response, timeout)
        }));

    // Not cut off by the request timeout
    let write_routes = Router::new()
        .route("/create", post(routes::index::create_index))
        .route("/insert", post(routes::insert::insert_single))
        .route("/insert/batch", post(routes::insert::insert_batch));

    let index_routes = read_routes
        .merge(write_routes)
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        // Streaming inserts
        .route("/insert/stream", get(stream_insert_handler));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let cors = cors_layer(&state.config.cors_origins);

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/index", index_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// Give the timeout layer's bare 408 the error envelope
async fn request_timeout_response(response: Response, limit: Duration) -> Response {
    if response.status() != StatusCode::REQUEST_TIMEOUT {
        return response;
    }
    ApiError::from(ServiceError::Timeout {
        operation: "request".to_string(),
        elapsed_ms: limit.as_millis() as u64,
        committed: None,
    })
    .into_response()
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(addr = %addr, "idxmngr API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("idxmngr API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
