//! Viewer presence tracking
//!
//! A listening session records that a viewer joined a stream and, when the
//! session ends, that they left. Presence is best-effort: store failures are
//! logged and never interrupt playback.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    models::{StreamId, ViewerId, ViewerRecordId},
    repository::ViewerStore,
};

/// Lifecycle of one presence record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceState {
    NotJoined,
    /// Insert sent, waiting for the store to assign an id
    Joining,
    Joined(ViewerRecordId),
    Left(ViewerRecordId),
}

/// Creates presence handles against a shared store
#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn ViewerStore>,
}

impl std::fmt::Debug for PresenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceTracker").finish()
    }
}

impl PresenceTracker {
    #[must_use]
    pub fn new(store: Arc<dyn ViewerStore>) -> Self {
        Self { store }
    }

    /// A fresh, not yet joined handle for one viewing session
    #[must_use]
    pub fn handle(&self, stream_id: StreamId, viewer_id: ViewerId) -> ViewerPresence {
        ViewerPresence {
            inner: Arc::new(PresenceInner {
                store: self.store.clone(),
                stream_id,
                viewer_id,
                state: Mutex::new(PresenceState::NotJoined),
            }),
        }
    }

    /// Join and return a guard that leaves when dropped
    pub async fn join(&self, stream_id: StreamId, viewer_id: ViewerId) -> PresenceGuard {
        let presence = self.handle(stream_id, viewer_id);
        presence.join().await;
        PresenceGuard::new(presence)
    }

    pub async fn active_viewer_count(&self, stream_id: &StreamId) -> crate::Result<i64> {
        self.store.active_viewer_count(stream_id).await
    }
}

struct PresenceInner {
    store: Arc<dyn ViewerStore>,
    stream_id: StreamId,
    viewer_id: ViewerId,
    state: Mutex<PresenceState>,
}

/// Handle on a single presence record.
///
/// Cloning shares the record; at most one `leave` reaches the store.
#[derive(Clone)]
pub struct ViewerPresence {
    inner: Arc<PresenceInner>,
}

impl std::fmt::Debug for ViewerPresence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerPresence")
            .field("stream_id", &self.inner.stream_id)
            .field("viewer_id", &self.inner.viewer_id)
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}

impl ViewerPresence {
    #[must_use]
    pub fn state(&self) -> PresenceState {
        self.inner.state.lock().clone()
    }

    /// Id assigned by the store, once join has resolved
    #[must_use]
    pub fn record_id(&self) -> Option<ViewerRecordId> {
        match &*self.inner.state.lock() {
            PresenceState::Joined(id) | PresenceState::Left(id) => Some(id.clone()),
            PresenceState::NotJoined | PresenceState::Joining => None,
        }
    }

    /// Insert an open presence record.
    ///
    /// Only the first call on a handle does anything. A store failure leaves
    /// the handle not joined and is logged, not returned.
    pub async fn join(&self) -> Option<ViewerRecordId> {
        {
            let mut state = self.inner.state.lock();
            if *state != PresenceState::NotJoined {
                debug!(state = ?*state, "Presence join ignored, already started");
                return None;
            }
            *state = PresenceState::Joining;
        }

        let inner = &self.inner;
        match inner.store.insert_viewer(&inner.stream_id, &inner.viewer_id).await {
            Ok(record) => {
                info!(
                    stream_id = %inner.stream_id,
                    viewer_id = %inner.viewer_id,
                    record_id = %record.id,
                    "Viewer joined stream"
                );
                *inner.state.lock() = PresenceState::Joined(record.id.clone());
                Some(record.id)
            }
            Err(e) => {
                warn!(
                    stream_id = %inner.stream_id,
                    viewer_id = %inner.viewer_id,
                    error = %e,
                    "Failed to record viewer join"
                );
                *inner.state.lock() = PresenceState::NotJoined;
                None
            }
        }
    }

    /// Close the presence record.
    ///
    /// A no-op unless join has resolved with a record id. Returns whether the
    /// store acknowledged the update; failures are logged, not returned.
    pub async fn leave(&self) -> bool {
        let record_id = {
            let mut state = self.inner.state.lock();
            let record_id = match &*state {
                PresenceState::Joined(id) => id.clone(),
                other => {
                    debug!(state = ?other, "Presence leave ignored, no open record");
                    return false;
                }
            };
            *state = PresenceState::Left(record_id.clone());
            record_id
        };

        let inner = &self.inner;
        match inner
            .store
            .mark_left(&record_id, &inner.viewer_id, Utc::now())
            .await
        {
            Ok(()) => {
                info!(
                    stream_id = %inner.stream_id,
                    viewer_id = %inner.viewer_id,
                    record_id = %record_id,
                    "Viewer left stream"
                );
                true
            }
            Err(e) => {
                warn!(
                    record_id = %record_id,
                    error = %e,
                    "Failed to record viewer leave"
                );
                false
            }
        }
    }
}

/// RAII guard that leaves the stream on drop.
///
/// Hold it for the lifetime of the viewing session. Dropping spawns the
/// leave on the current Tokio runtime without waiting for it; use
/// [`PresenceGuard::release`] to await the store instead.
pub struct PresenceGuard(Option<ViewerPresence>);

impl PresenceGuard {
    #[must_use]
    pub const fn new(presence: ViewerPresence) -> Self {
        Self(Some(presence))
    }

    #[must_use]
    pub fn presence(&self) -> Option<&ViewerPresence> {
        self.0.as_ref()
    }

    /// Leave now and wait for the store
    pub async fn release(mut self) -> bool {
        match self.0.take() {
            Some(presence) => presence.leave().await,
            None => false,
        }
    }
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        let Some(presence) = self.0.take() else {
            return;
        };
        if presence.record_id().is_none() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    presence.leave().await;
                });
            }
            Err(_) => {
                warn!(?presence, "No runtime available, presence record left open");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ViewerRecord;
    use crate::repository::InMemoryViewerStore;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Store whose inserts block until the test opens the gate
    struct GatedStore {
        inner: InMemoryViewerStore,
        gate: Notify,
    }

    #[async_trait]
    impl ViewerStore for GatedStore {
        async fn insert_viewer(
            &self,
            stream_id: &StreamId,
            viewer_id: &ViewerId,
        ) -> crate::Result<ViewerRecord> {
            self.gate.notified().await;
            self.inner.insert_viewer(stream_id, viewer_id).await
        }

        async fn mark_left(
            &self,
            record_id: &ViewerRecordId,
            viewer_id: &ViewerId,
            left_at: DateTime<Utc>,
        ) -> crate::Result<()> {
            self.inner.mark_left(record_id, viewer_id, left_at).await
        }

        async fn active_viewer_count(&self, stream_id: &StreamId) -> crate::Result<i64> {
            self.inner.active_viewer_count(stream_id).await
        }
    }

    /// Store that always fails
    struct BrokenStore;

    #[async_trait]
    impl ViewerStore for BrokenStore {
        async fn insert_viewer(&self, _: &StreamId, _: &ViewerId) -> crate::Result<ViewerRecord> {
            Err(crate::Error::PresenceWrite("store offline".to_string()))
        }

        async fn mark_left(
            &self,
            _: &ViewerRecordId,
            _: &ViewerId,
            _: DateTime<Utc>,
        ) -> crate::Result<()> {
            Err(crate::Error::PresenceWrite("store offline".to_string()))
        }

        async fn active_viewer_count(&self, _: &StreamId) -> crate::Result<i64> {
            Err(crate::Error::PresenceWrite("store offline".to_string()))
        }
    }

    fn ids() -> (StreamId, ViewerId) {
        (StreamId::from("s1"), ViewerId::from("u1"))
    }

    #[tokio::test]
    async fn test_join_then_leave_closes_exactly_one_record() {
        let store = Arc::new(InMemoryViewerStore::new());
        let tracker = PresenceTracker::new(store.clone());
        let (stream, viewer) = ids();

        let presence = tracker.handle(stream.clone(), viewer);
        let record_id = presence.join().await.unwrap();
        assert_eq!(presence.state(), PresenceState::Joined(record_id.clone()));
        assert_eq!(tracker.active_viewer_count(&stream).await.unwrap(), 1);

        assert!(presence.leave().await);
        assert_eq!(presence.state(), PresenceState::Left(record_id.clone()));

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].left_at.is_some());
        assert_eq!(tracker.active_viewer_count(&stream).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_leave_before_join_resolves_is_noop() {
        let store = Arc::new(GatedStore {
            inner: InMemoryViewerStore::new(),
            gate: Notify::new(),
        });
        let tracker = PresenceTracker::new(store.clone());
        let (stream, viewer) = ids();

        let presence = tracker.handle(stream, viewer);
        let joining = presence.clone();
        let join_task = tokio::spawn(async move { joining.join().await });

        while presence.state() != PresenceState::Joining {
            tokio::task::yield_now().await;
        }
        assert!(!presence.leave().await);
        assert_eq!(store.inner.leave_count(), 0);

        store.gate.notify_one();
        let record_id = join_task.await.unwrap().unwrap();
        assert_eq!(store.inner.leave_count(), 0);
        assert!(store.inner.get(&record_id).unwrap().is_present());
    }

    #[tokio::test]
    async fn test_second_leave_does_not_reach_store() {
        let store = Arc::new(InMemoryViewerStore::new());
        let tracker = PresenceTracker::new(store.clone());
        let (stream, viewer) = ids();

        let presence = tracker.handle(stream, viewer);
        presence.join().await;
        assert!(presence.leave().await);
        assert!(!presence.leave().await);
        assert!(!presence.clone().leave().await);
        assert_eq!(store.leave_count(), 1);
    }

    #[tokio::test]
    async fn test_rejoin_on_same_handle_is_ignored() {
        let store = Arc::new(InMemoryViewerStore::new());
        let tracker = PresenceTracker::new(store.clone());
        let (stream, viewer) = ids();

        let presence = tracker.handle(stream, viewer);
        assert!(presence.join().await.is_some());
        presence.leave().await;
        assert!(presence.join().await.is_none());
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_store_failures_are_swallowed() {
        let tracker = PresenceTracker::new(Arc::new(BrokenStore));
        let (stream, viewer) = ids();

        let presence = tracker.handle(stream, viewer);
        assert!(presence.join().await.is_none());
        assert_eq!(presence.state(), PresenceState::NotJoined);
        assert!(!presence.leave().await);
    }

    #[tokio::test]
    async fn test_guard_leaves_on_drop() {
        let store = Arc::new(InMemoryViewerStore::new());
        let tracker = PresenceTracker::new(store.clone());
        let (stream, viewer) = ids();

        let guard = tracker.join(stream, viewer).await;
        let record_id = guard.presence().and_then(ViewerPresence::record_id).unwrap();
        drop(guard);

        for _ in 0..100 {
            if store.leave_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.leave_count(), 1);
        assert!(!store.get(&record_id).unwrap().is_present());
    }

    #[tokio::test]
    async fn test_guard_release_awaits_leave() {
        let store = Arc::new(InMemoryViewerStore::new());
        let tracker = PresenceTracker::new(store.clone());
        let (stream, viewer) = ids();

        let guard = tracker.join(stream, viewer).await;
        assert!(guard.release().await);
        assert_eq!(store.leave_count(), 1);
    }
}
