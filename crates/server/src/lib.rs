pub mod config;
pub mod error;
pub mod routes;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::routes::analysis::JobSlots;

/// Request bodies larger than this are rejected.
const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Build the HTTP application.
pub fn app(config: Config) -> Router {
    let slots = JobSlots::new(config.max_concurrent_jobs);

    // CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/", get(routes::health::health_check))
        .route("/health", get(routes::health::health_check))
        // Analysis jobs
        .route("/scan", post(routes::analysis::scan))
        .route("/analyze-candidates", post(routes::analysis::analyze_candidates))
        .route("/analyze", post(routes::analysis::analyze))
        // Shared state
        .layer(Extension(config))
        .layer(Extension(slots))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
}
