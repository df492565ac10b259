//! Playback session orchestration
//!
//! A session validates the playback URL, registers the listener's presence,
//! then keeps the stream connected: probe, poll while live, retry on failure
//! until the retry budget runs out. Ending the session for any reason
//! cancels the pending retry and releases presence.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    probe::PlaylistProbe,
    retry::{RetryController, RetryPolicy},
    stream_key::StreamKeyValidator,
};
use crate::{
    config::PlaybackConfig,
    error::PlaybackError,
    models::{StreamId, ViewerId},
    service::{PresenceGuard, PresenceTracker, ViewerPresence},
};

/// What a listener should currently be shown
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Connecting,
    Playing,
    Retrying { attempt: u32, max_attempts: u32 },
    Failed { reason: String },
    Closed,
}

/// Who is listening; presence is only tracked when both ids are known
struct ListenerIdentity {
    tracker: PresenceTracker,
    stream_id: Option<StreamId>,
    viewer_id: Option<ViewerId>,
}

pub struct PlaybackSession {
    playback_url: String,
    probe: Arc<dyn PlaylistProbe>,
    validator: StreamKeyValidator,
    retry: RetryController,
    retry_delay: Duration,
    poll_interval: Duration,
    identity: Option<ListenerIdentity>,
    presence: Option<PresenceGuard>,
    status: watch::Sender<SessionStatus>,
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("playback_url", &self.playback_url)
            .field("retry", &self.retry)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl PlaybackSession {
    #[must_use]
    pub fn new(
        playback_url: impl Into<String>,
        probe: Arc<dyn PlaylistProbe>,
        config: &PlaybackConfig,
    ) -> Self {
        let policy = RetryPolicy::from(config);
        let (status, _) = watch::channel(SessionStatus::Idle);
        Self {
            playback_url: playback_url.into(),
            probe,
            validator: StreamKeyValidator::new(),
            retry: RetryController::from_policy(&policy),
            retry_delay: policy.delay,
            poll_interval: config.poll_interval(),
            identity: None,
            presence: None,
            status,
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryController::from_policy(&policy);
        self.retry_delay = policy.delay;
        self
    }

    /// Track the listener's presence for the lifetime of the session
    #[must_use]
    pub fn with_presence(
        mut self,
        tracker: PresenceTracker,
        stream_id: Option<StreamId>,
        viewer_id: Option<ViewerId>,
    ) -> Self {
        self.identity = Some(ListenerIdentity {
            tracker,
            stream_id,
            viewer_id,
        });
        self
    }

    #[must_use]
    pub fn playback_url(&self) -> &str {
        &self.playback_url
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.retry.current_attempt()
    }

    #[must_use]
    pub fn has_pending_retry(&self) -> bool {
        self.retry.has_pending()
    }

    #[must_use]
    pub fn presence(&self) -> Option<&ViewerPresence> {
        self.presence.as_ref().and_then(PresenceGuard::presence)
    }

    /// Drive the session until `shutdown` fires or the stream is lost for good.
    ///
    /// Returns `Ok(())` on shutdown. Validation failures return before any
    /// network use; connection failures only escape as `RetriesExhausted`.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), PlaybackError> {
        if let Err(e) = self.validator.validate(&self.playback_url).into_result() {
            warn!(url = %self.playback_url, error = %e, "Refusing to play stream");
            self.set_status(SessionStatus::Failed {
                reason: e.user_message(),
            });
            return Err(e);
        }

        self.start_presence();

        loop {
            let failure = tokio::select! {
                () = shutdown.cancelled() => None,
                failure = self.play_until_failure() => Some(failure),
            };
            let Some(failure) = failure else {
                self.teardown();
                return Ok(());
            };

            warn!(
                url = %self.playback_url,
                attempt = self.retry.current_attempt(),
                error = %failure,
                "Playback connection failed"
            );

            let wake = Arc::new(Notify::new());
            let notify = wake.clone();
            if !self
                .retry
                .schedule_retry(move || notify.notify_one(), self.retry_delay)
            {
                let err = PlaybackError::RetriesExhausted {
                    attempts: self.retry.max_attempts(),
                    last_error: failure.to_string(),
                };
                error!(url = %self.playback_url, error = %err, "Giving up on stream");
                self.set_status(SessionStatus::Failed {
                    reason: err.user_message(),
                });
                return Err(err);
            }

            self.set_status(SessionStatus::Retrying {
                attempt: self.retry.current_attempt(),
                max_attempts: self.retry.max_attempts(),
            });

            let cancelled = tokio::select! {
                () = shutdown.cancelled() => true,
                () = wake.notified() => false,
            };
            if cancelled {
                self.teardown();
                return Ok(());
            }
        }
    }

    /// End the session and wait for the presence store to acknowledge
    pub async fn close(mut self) {
        self.retry.clear_pending();
        if let Some(guard) = self.presence.take() {
            guard.release().await;
        }
        self.set_status(SessionStatus::Closed);
    }

    /// Connect, then poll until the stream stops answering
    async fn play_until_failure(&mut self) -> PlaybackError {
        self.set_status(SessionStatus::Connecting);
        if let Err(e) = self.probe.probe(&self.playback_url).await {
            return e;
        }

        if self.retry.current_attempt() > 0 {
            info!(
                url = %self.playback_url,
                retries = self.retry.current_attempt(),
                "Reconnected to stream"
            );
        }
        self.retry.reset();
        self.set_status(SessionStatus::Playing);

        loop {
            tokio::time::sleep(self.poll_interval).await;
            if let Err(e) = self.probe.probe(&self.playback_url).await {
                return e;
            }
        }
    }

    /// Join in the background so a slow store never delays playback
    fn start_presence(&mut self) {
        if self.presence.is_some() {
            return;
        }
        let Some(identity) = &self.identity else {
            return;
        };
        let (Some(stream_id), Some(viewer_id)) = (&identity.stream_id, &identity.viewer_id) else {
            debug!("Presence tracking skipped, stream or viewer identity missing");
            return;
        };

        let presence = identity.tracker.handle(stream_id.clone(), viewer_id.clone());
        let joining = presence.clone();
        tokio::spawn(async move {
            joining.join().await;
        });
        self.presence = Some(PresenceGuard::new(presence));
    }

    fn teardown(&mut self) {
        self.retry.clear_pending();
        // Guard drop issues the leave without waiting for it
        self.presence.take();
        if *self.status.borrow() != SessionStatus::Closed {
            debug!(url = %self.playback_url, "Playback session closed");
            self.set_status(SessionStatus::Closed);
        }
    }

    fn set_status(&self, status: SessionStatus) {
        self.status.send_replace(status);
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryViewerStore, ViewerStore};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LIVE_URL: &str = "http://media.test:8000/live/nf_set42/index.m3u8";

    /// Probe that replays scripted outcomes, then fails forever
    #[derive(Default)]
    struct ScriptedProbe {
        script: Mutex<VecDeque<bool>>,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(script: &[bool]) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.iter().copied().collect()),
                calls: AtomicUsize::new(0),
            })
        }

        fn always_up() -> Arc<Self> {
            Self::new(&[true; 64])
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PlaylistProbe for ScriptedProbe {
        async fn probe(&self, _playback_url: &str) -> Result<(), PlaybackError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.script.lock().pop_front().unwrap_or(false) {
                Ok(())
            } else {
                Err(PlaybackError::Connection("connection refused".to_string()))
            }
        }
    }

    fn config() -> PlaybackConfig {
        PlaybackConfig::default()
    }

    fn cancel_after(token: &CancellationToken, after: Duration) {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            token.cancel();
        });
    }

    async fn wait_for_leaves(store: &InMemoryViewerStore, expected: usize) {
        for _ in 0..100 {
            if store.leave_count() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_key_fails_before_network() {
        let probe = ScriptedProbe::always_up();
        let store = Arc::new(InMemoryViewerStore::new());
        let mut session = PlaybackSession::new(
            "http://media.test:8000/live/bad_key/index.m3u8",
            probe.clone(),
            &config(),
        )
        .with_presence(
            PresenceTracker::new(store.clone()),
            Some(StreamId::from("s1")),
            Some(ViewerId::from("u1")),
        );

        let err = session.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Validation(_)));
        assert_eq!(probe.calls(), 0);
        assert!(store.records().is_empty());
        assert!(matches!(session.status(), SessionStatus::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhaust_after_max_attempts() {
        let probe = ScriptedProbe::new(&[]);
        let mut session = PlaybackSession::new(LIVE_URL, probe.clone(), &config());

        let started = tokio::time::Instant::now();
        let err = session.run(CancellationToken::new()).await.unwrap_err();

        assert_eq!(
            err,
            PlaybackError::RetriesExhausted {
                attempts: 3,
                last_error: "Connection failed: connection refused".to_string(),
            }
        );
        // One initial attempt plus three retries, five seconds apart
        assert_eq!(probe.calls(), 4);
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert!(!session.has_pending_retry());
        assert!(matches!(session.status(), SessionStatus::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_reconnect_resets_budget() {
        // fail, fail, recover, then lose the stream for good
        let probe = ScriptedProbe::new(&[false, false, true]);
        let mut session = PlaybackSession::new(LIVE_URL, probe.clone(), &config());

        let err = session.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PlaybackError::RetriesExhausted { attempts: 3, .. }));
        // 3 before recovery, then the failed poll plus three retries
        assert_eq!(probe.calls(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playing_session_polls_until_shutdown() {
        let probe = ScriptedProbe::always_up();
        let mut session = PlaybackSession::new(LIVE_URL, probe.clone(), &config());
        let mut status = session.subscribe();

        let token = CancellationToken::new();
        cancel_after(&token, Duration::from_secs(35));
        session.run(token).await.unwrap();

        // Initial probe plus polls at 10s, 20s and 30s
        assert_eq!(probe.calls(), 4);
        assert_eq!(session.current_attempt(), 0);
        assert_eq!(*status.borrow_and_update(), SessionStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_retrying() {
        let probe = ScriptedProbe::new(&[]);
        let mut session = PlaybackSession::new(LIVE_URL, probe, &config());
        let mut status = session.subscribe();

        let observer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while status.changed().await.is_ok() {
                seen.push(status.borrow_and_update().clone());
            }
            seen
        });

        let token = CancellationToken::new();
        cancel_after(&token, Duration::from_secs(7));
        session.run(token).await.unwrap();
        drop(session);

        let seen = observer.await.unwrap();
        assert!(seen.contains(&SessionStatus::Retrying {
            attempt: 1,
            max_attempts: 3
        }));
        assert_eq!(seen.last(), Some(&SessionStatus::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_retry_and_leaves_once() {
        let probe = ScriptedProbe::new(&[true]);
        let store = Arc::new(InMemoryViewerStore::new());
        let mut session = PlaybackSession::new(LIVE_URL, probe, &config()).with_presence(
            PresenceTracker::new(store.clone()),
            Some(StreamId::from("s1")),
            Some(ViewerId::from("u1")),
        );

        // Stream drops at the first poll (10s); cancel while the retry is armed
        let token = CancellationToken::new();
        cancel_after(&token, Duration::from_secs(12));
        session.run(token).await.unwrap();

        assert!(!session.has_pending_retry());
        assert_eq!(session.status(), SessionStatus::Closed);

        drop(session);
        wait_for_leaves(&store, 1).await;

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].left_at.is_some());
        assert_eq!(store.leave_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_after_failure_releases_presence() {
        let probe = ScriptedProbe::new(&[]);
        let store = Arc::new(InMemoryViewerStore::new());
        let mut session = PlaybackSession::new(LIVE_URL, probe, &config()).with_presence(
            PresenceTracker::new(store.clone()),
            Some(StreamId::from("s1")),
            Some(ViewerId::from("u1")),
        );

        assert!(session.run(CancellationToken::new()).await.is_err());
        // The listener is still on the error screen until the session closes
        assert_eq!(store.active_viewer_count(&StreamId::from("s1")).await.unwrap(), 1);

        session.close().await;
        assert_eq!(store.leave_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_presence_requires_both_ids() {
        let probe = ScriptedProbe::always_up();
        let store = Arc::new(InMemoryViewerStore::new());
        let mut session = PlaybackSession::new(LIVE_URL, probe, &config()).with_presence(
            PresenceTracker::new(store.clone()),
            Some(StreamId::from("s1")),
            None,
        );

        let token = CancellationToken::new();
        cancel_after(&token, Duration::from_secs(1));
        session.run(token).await.unwrap();

        assert!(session.presence().is_none());
        assert!(store.records().is_empty());
    }
}
