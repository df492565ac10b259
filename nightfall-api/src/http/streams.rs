//! Stream key endpoints

use axum::{extract::State, Json};
use nightfall_core::playback::{StreamEndpoints, StreamKeyValidation, StreamKeyValidator};
use serde::{Deserialize, Serialize};

use crate::http::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateUrlRequest {
    pub url: String,
}

/// Issue a fresh stream key with its publish and playback URLs
pub async fn create_stream_key(State(state): State<AppState>) -> Json<StreamEndpoints> {
    let endpoints = state.services.stream_urls.new_endpoints();
    tracing::info!(stream_key = %endpoints.stream_key, "Issued stream key");
    Json(endpoints)
}

/// Check the key embedded in a playback URL
pub async fn validate_playback_url(
    Json(req): Json<ValidateUrlRequest>,
) -> Json<StreamKeyValidation> {
    Json(StreamKeyValidator::new().validate(&req.url))
}
