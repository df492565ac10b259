//! Viewer presence endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use nightfall_core::models::{
    JoinStreamRequest, JoinStreamResponse, LeaveStreamRequest, StreamId, ViewerCountResponse,
    ViewerId, ViewerRecordId,
};

use super::{AppError, AppResult};
use crate::http::AppState;

fn require_viewer_id(viewer_id: ViewerId) -> AppResult<ViewerId> {
    if viewer_id.as_str().trim().is_empty() {
        return Err(AppError::bad_request("viewer_id is required"));
    }
    Ok(viewer_id)
}

/// Record a viewer joining a stream
pub async fn join_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Json(req): Json<JoinStreamRequest>,
) -> AppResult<(StatusCode, Json<JoinStreamResponse>)> {
    let viewer_id = require_viewer_id(req.viewer_id)?;
    let stream_id = StreamId::from(stream_id);

    let record = state
        .services
        .viewer_store
        .insert_viewer(&stream_id, &viewer_id)
        .await?;

    tracing::info!(
        stream_id = %stream_id,
        viewer_id = %viewer_id,
        record_id = %record.id,
        "Viewer joined"
    );

    Ok((
        StatusCode::CREATED,
        Json(JoinStreamResponse {
            record_id: record.id,
        }),
    ))
}

/// Stamp the leave time on the caller's own open record
pub async fn leave_stream(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
    Json(req): Json<LeaveStreamRequest>,
) -> AppResult<StatusCode> {
    let viewer_id = require_viewer_id(req.viewer_id)?;
    let record_id = ViewerRecordId::from(record_id);

    state
        .services
        .viewer_store
        .mark_left(&record_id, &viewer_id, Utc::now())
        .await?;

    tracing::info!(record_id = %record_id, viewer_id = %viewer_id, "Viewer left");
    Ok(StatusCode::NO_CONTENT)
}

/// Number of distinct viewers currently watching
pub async fn active_viewers(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> AppResult<Json<ViewerCountResponse>> {
    let stream_id = StreamId::from(stream_id);
    let active_viewers = state
        .services
        .presence_tracker
        .active_viewer_count(&stream_id)
        .await?;

    Ok(Json(ViewerCountResponse {
        stream_id,
        active_viewers,
    }))
}
