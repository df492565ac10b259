//! In-process presence store
//!
//! Applies the same ownership and set-once rules as the Postgres store. Used
//! for offline playback sessions and by tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::viewer::ViewerStore;
use crate::{
    models::{StreamId, ViewerId, ViewerRecord, ViewerRecordId},
    Error, Result,
};

#[derive(Default)]
pub struct InMemoryViewerStore {
    records: Mutex<HashMap<ViewerRecordId, ViewerRecord>>,
    leaves: AtomicUsize,
}

impl InMemoryViewerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, record_id: &ViewerRecordId) -> Option<ViewerRecord> {
        self.records.lock().get(record_id).cloned()
    }

    #[must_use]
    pub fn records(&self) -> Vec<ViewerRecord> {
        self.records.lock().values().cloned().collect()
    }

    /// Number of successful `mark_left` updates applied so far
    #[must_use]
    pub fn leave_count(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ViewerStore for InMemoryViewerStore {
    async fn insert_viewer(
        &self,
        stream_id: &StreamId,
        viewer_id: &ViewerId,
    ) -> Result<ViewerRecord> {
        let record = ViewerRecord::new(ViewerRecordId::new(), stream_id.clone(), viewer_id.clone());
        self.records.lock().insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn mark_left(
        &self,
        record_id: &ViewerRecordId,
        viewer_id: &ViewerId,
        left_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut records = self.records.lock();
        match records.get_mut(record_id) {
            Some(record) if &record.viewer_id == viewer_id && record.left_at.is_none() => {
                record.left_at = Some(left_at);
                self.leaves.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(Error::NotFound(format!(
                "No open presence record {record_id} for this viewer"
            ))),
        }
    }

    async fn active_viewer_count(&self, stream_id: &StreamId) -> Result<i64> {
        let records = self.records.lock();
        let mut viewers: Vec<&ViewerId> = records
            .values()
            .filter(|r| &r.stream_id == stream_id && r.is_present())
            .map(|r| &r.viewer_id)
            .collect();
        viewers.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        viewers.dedup();
        Ok(viewers.len() as i64)
    }
}
