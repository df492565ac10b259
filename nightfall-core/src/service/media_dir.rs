//! Media output directory shared with the external media server
//!
//! The media server writes one directory per stream under `<root>/live/`,
//! each holding an `index.m3u8` while the stream is on air.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::Result;

const LIVE_DIR: &str = "live";
const PLAYLIST_FILE: &str = "index.m3u8";

/// Streams known to the media server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCounts {
    /// Streams currently serving a playlist
    pub active: usize,
    /// Streams that have ever written output
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct MediaDirectory {
    root: PathBuf,
}

impl MediaDirectory {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn live_dir(&self) -> PathBuf {
        self.root.join(LIVE_DIR)
    }

    /// Create the media root and its live directory if they are missing
    pub async fn ensure(&self) -> Result<()> {
        let live = self.live_dir();
        tokio::fs::create_dir_all(&live).await?;
        info!(path = %live.display(), "Media directory ready");
        Ok(())
    }

    /// Count stream directories and those with a playlist present
    pub async fn stream_counts(&self) -> Result<StreamCounts> {
        let live = self.live_dir();
        let mut entries = match tokio::fs::read_dir(&live).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StreamCounts::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut counts = StreamCounts::default();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            counts.total += 1;
            if tokio::fs::try_exists(entry.path().join(PLAYLIST_FILE)).await? {
                counts.active += 1;
            }
        }

        Ok(counts)
    }
}
