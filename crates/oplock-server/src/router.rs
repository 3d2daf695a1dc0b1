//! Router assembly for the lock HTTP API.
//!
//! [`build_router`] wires all handler functions to their routes with
//! CORS and tracing middleware layers.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Builds the complete axum router with all API routes.
///
/// `GET /locks/debug` is only mounted when `debug_endpoint` is enabled in
/// the state's config; otherwise it falls through to a 404.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Queries
        .route("/locks/check", get(handlers::locks::check_lock))
        .route("/locks/check-batch", post(handlers::locks::check_batch))
        // Mutations
        .route("/locks/acquire", post(handlers::locks::acquire_lock))
        .route("/locks/release", post(handlers::locks::release_lock))
        .route("/locks/release-all", post(handlers::locks::release_all))
        // Administrative
        .route("/locks/block", post(handlers::locks::block_lock))
        .route("/locks/clear", post(handlers::locks::clear_lock));

    if state.config.debug_endpoint {
        router = router.route("/locks/debug", get(handlers::debug::dump_locks));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
