use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{StreamId, ViewerId, ViewerRecordId};

/// A listener's presence on a stream.
///
/// `left_at` stays unset while the listener is watching and is written once
/// when they leave. Records are never deleted by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerRecord {
    pub id: ViewerRecordId,
    pub stream_id: StreamId,
    pub viewer_id: ViewerId,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl ViewerRecord {
    #[must_use]
    pub fn new(id: ViewerRecordId, stream_id: StreamId, viewer_id: ViewerId) -> Self {
        Self {
            id,
            stream_id,
            viewer_id,
            joined_at: Utc::now(),
            left_at: None,
        }
    }

    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.left_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinStreamRequest {
    pub viewer_id: ViewerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinStreamResponse {
    pub record_id: ViewerRecordId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveStreamRequest {
    pub viewer_id: ViewerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerCountResponse {
    pub stream_id: StreamId,
    pub active_viewers: i64,
}
