//! Stream key conventions
//!
//! Playback URLs embed the publisher's key as `.../live/<key>/index.m3u8`.
//! Checking the key before connecting turns an obviously malformed URL into
//! a clear message instead of a generic connection failure. This is not
//! authentication.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::PlaybackError;

/// Prefix every Nightfall stream key carries
pub const STREAM_KEY_PREFIX: &str = "nf_";

/// Length of the random part of a generated key
const STREAM_KEY_SUFFIX_LEN: usize = 16;

/// Message shown when a playback URL carries a foreign key
pub const INVALID_STREAM_KEY_MESSAGE: &str =
    "Invalid stream key format. Stream keys must start with 'nf_'.";

/// Key segment between `/live/` and `/index.m3u8`; an empty segment still matches
static LIVE_KEY_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"/live/([^/]*)/index\.m3u8")
        .expect("live key regex is a compile-time constant and always valid")
});

/// Generate a fresh publish key (`nf_` + 16 random characters)
#[must_use]
pub fn generate_stream_key() -> String {
    format!("{STREAM_KEY_PREFIX}{}", nanoid::nanoid!(STREAM_KEY_SUFFIX_LEN))
}

/// Return the key embedded in a playback URL, if the URL follows the live convention
#[must_use]
pub fn extract_stream_key(playback_url: &str) -> Option<&str> {
    LIVE_KEY_PATTERN
        .captures(playback_url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Outcome of a stream key check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamKeyValidation {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamKeyValidation {
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(message.into()),
        }
    }

    pub fn into_result(self) -> Result<(), PlaybackError> {
        if self.is_valid {
            Ok(())
        } else {
            Err(PlaybackError::Validation(
                self.error
                    .unwrap_or_else(|| INVALID_STREAM_KEY_MESSAGE.to_string()),
            ))
        }
    }
}

/// Pre-flight check for playback URLs
#[derive(Debug, Clone)]
pub struct StreamKeyValidator {
    prefix: String,
}

impl Default for StreamKeyValidator {
    fn default() -> Self {
        Self {
            prefix: STREAM_KEY_PREFIX.to_string(),
        }
    }
}

impl StreamKeyValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Validate the key embedded in `playback_url`.
    ///
    /// URLs that do not follow the `/live/<key>/index.m3u8` convention are
    /// accepted as-is. A bare prefix with no suffix is accepted.
    #[must_use]
    pub fn validate(&self, playback_url: &str) -> StreamKeyValidation {
        match extract_stream_key(playback_url) {
            None => StreamKeyValidation::valid(),
            Some(key) if key.starts_with(&self.prefix) => StreamKeyValidation::valid(),
            Some(key) => {
                tracing::debug!(stream_key = %key, "Rejected stream key without expected prefix");
                if self.prefix == STREAM_KEY_PREFIX {
                    StreamKeyValidation::invalid(INVALID_STREAM_KEY_MESSAGE)
                } else {
                    StreamKeyValidation::invalid(format!(
                        "Invalid stream key format. Stream keys must start with '{}'.",
                        self.prefix
                    ))
                }
            }
        }
    }
}
