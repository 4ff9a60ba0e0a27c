//! Router construction.
//!
//! Builds the axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware::from_fn;
use axum::routing::get;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::live_reload::{self, SCRIPT_PATH, WS_PATH};
use crate::middleware::headers;
use crate::state::AppState;
use crate::static_files;

/// Response-shaping options applied as router layers.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Layers {
    pub(crate) max_age: Option<Duration>,
    pub(crate) cors: bool,
    pub(crate) compression: bool,
    pub(crate) request_logging: bool,
}

/// Create the application router.
///
/// Layers wrap from the inside out: snippet injection sees the plain body,
/// then cache and CORS headers, compression, and request tracing.
pub(crate) fn create_router(state: Arc<AppState>, layers: Layers) -> Router {
    let mut router = Router::new();

    if state.live_reload.is_some() {
        router = router
            .route(WS_PATH, get(live_reload::ws_handler))
            .route(SCRIPT_PATH, get(live_reload::client_script));
    }

    router = router.fallback(static_files::serve);

    if state.live_reload.is_some() {
        router = router.layer(from_fn(live_reload::inject_snippet));
    }

    router = router.layer(headers::cache_control_layer(layers.max_age));

    if layers.cors {
        router = router.layer(headers::cors_layer());
    }
    if layers.compression {
        router = router.layer(CompressionLayer::new());
    }
    if layers.request_logging {
        router = router.layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );
    }

    router.with_state(state)
}
