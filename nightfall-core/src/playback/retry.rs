//! Bounded fixed-delay retry scheduling for a single playback session
//!
//! Each session owns its own controller; there is no shared retry state.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::PlaybackConfig;

/// Default number of retries before a session gives up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between a failure and the next attempt
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Retry limits for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl From<&PlaybackConfig> for RetryPolicy {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            max_attempts: config.max_retry_attempts,
            delay: config.retry_delay(),
        }
    }
}

/// Counts retry attempts and arms at most one delayed callback at a time.
///
/// Timers run as Tokio tasks, so `schedule_retry` must be called from within
/// a runtime. Dropping the controller cancels whatever is still armed.
#[derive(Debug)]
pub struct RetryController {
    attempt_count: u32,
    max_attempts: u32,
    pending: Option<JoinHandle<()>>,
}

impl RetryController {
    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            attempt_count: 0,
            max_attempts,
            pending: None,
        }
    }

    #[must_use]
    pub const fn from_policy(policy: &RetryPolicy) -> Self {
        Self::new(policy.max_attempts)
    }

    /// Arm `callback` to run once after `delay`.
    ///
    /// Returns `false` without scheduling anything once `max_attempts` retries
    /// have been used; the caller must then treat the session as failed.
    pub fn schedule_retry<F>(&mut self, callback: F, delay: Duration) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.attempt_count >= self.max_attempts {
            debug!(
                attempts = self.attempt_count,
                max_attempts = self.max_attempts,
                "Retry budget exhausted"
            );
            return false;
        }

        // Never leave two timers armed
        self.clear_pending();
        self.attempt_count += 1;

        debug!(
            attempt = self.attempt_count,
            max_attempts = self.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling retry"
        );

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        }));

        true
    }

    /// Cancel the armed callback, if any. Safe to call repeatedly.
    pub fn clear_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Start counting from zero again (after a successful reconnect)
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.attempt_count
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether a callback is armed and has not fired yet
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Default for RetryController {
    fn default() -> Self {
        Self::from_policy(&RetryPolicy::default())
    }
}

impl Drop for RetryController {
    fn drop(&mut self) {
        self.clear_pending();
    }
}
