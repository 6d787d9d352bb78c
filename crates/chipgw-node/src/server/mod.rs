//! Gateway HTTP server
//!
//! One catch-all proxy route plus a liveness probe. Anything else is a
//! routing error and gets the same generic 500 as a failed exchange.

pub mod proxy;

use axum::{
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Create the server router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(proxy::health))
        // Device proxy
        .route("/:target/", any(proxy::forward_root))
        .route("/:target/*path", any(proxy::forward))
        .fallback(proxy::unmatched)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
