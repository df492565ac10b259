//! Health check endpoint
//!
//! Reports server status, stream counts from the media directory and the
//! configured ports, for monitoring probes and operational tooling.

use axum::{extract::State, routing::get, Json, Router};
use nightfall_core::service::StreamCounts;
use serde::{Deserialize, Serialize};

use crate::http::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortInfo {
    pub http: u16,
    pub rtmp: u16,
    pub hls: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// "ok", or "degraded" when the media directory cannot be read
    pub status: String,
    pub streams: StreamCounts,
    pub ports: PortInfo,
}

/// Health check router
pub fn create_health_router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Always answers while the server is running; never fails the probe
pub async fn health_check(State(state): State<AppState>) -> Json<HealthReport> {
    let (status, streams) = match state.services.media_directory.stream_counts().await {
        Ok(counts) => ("ok", counts),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read media directory");
            ("degraded", StreamCounts::default())
        }
    };

    Json(HealthReport {
        status: status.to_string(),
        streams,
        ports: PortInfo {
            http: state.config.server.http_port,
            rtmp: state.config.streaming.rtmp_port,
            hls: state.config.streaming.hls_port,
        },
    })
}
