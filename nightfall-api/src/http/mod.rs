// Module: http
// HTTP/JSON API for stream keys, viewer presence and health

pub mod error;
pub mod health;
pub mod streams;
pub mod viewers;

use axum::{routing::post, Router};
use nightfall_core::{bootstrap::Services, Config};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(services: Services, config: Arc<Config>) -> Self {
        Self { services, config }
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/streams/keys", post(streams::create_stream_key))
        .route("/api/streams/validate", post(streams::validate_playback_url))
        .route(
            "/api/streams/{stream_id}/viewers",
            post(viewers::join_stream).get(viewers::active_viewers),
        )
        .route("/api/viewers/{record_id}/leave", post(viewers::leave_stream));

    Router::new()
        .merge(health::create_health_router())
        .merge(api)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
