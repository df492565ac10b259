//! Playlist reachability checks
//!
//! A probe is one connection attempt against the media server. It carries
//! its own request timeout; the retry delay between attempts lives in the
//! session.

use async_trait::async_trait;
use std::time::Duration;

use crate::{error::PlaybackError, Error, Result};

/// First line of every HLS playlist
const M3U8_HEADER: &str = "#EXTM3U";

#[async_trait]
pub trait PlaylistProbe: Send + Sync {
    /// Succeeds when the playlist at `playback_url` is being served
    async fn probe(&self, playback_url: &str) -> std::result::Result<(), PlaybackError>;
}

/// Probe that fetches the playlist over HTTP
#[derive(Debug, Clone)]
pub struct HttpPlaylistProbe {
    client: reqwest::Client,
}

impl HttpPlaylistProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PlaylistProbe for HttpPlaylistProbe {
    async fn probe(&self, playback_url: &str) -> std::result::Result<(), PlaybackError> {
        let response = self
            .client
            .get(playback_url)
            .send()
            .await
            .map_err(|e| PlaybackError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlaybackError::Connection(format!(
                "Playlist request returned {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PlaybackError::Connection(e.to_string()))?;

        if !body.trim_start().starts_with(M3U8_HEADER) {
            return Err(PlaybackError::Connection(
                "Response is not an HLS playlist".to_string(),
            ));
        }

        Ok(())
    }
}
