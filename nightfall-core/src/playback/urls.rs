//! Publish and playback URL conventions of the external media server

use serde::{Deserialize, Serialize};

use super::stream_key::generate_stream_key;
use crate::config::StreamingConfig;

/// RTMP application every DJ publishes into
pub const LIVE_APP: &str = "live";

/// Everything a DJ needs to go live and a listener needs to tune in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEndpoints {
    pub stream_key: String,
    /// RTMP ingest URL; the publishing tool appends the key itself
    pub publish_url: String,
    pub playback_url: String,
}

#[derive(Debug, Clone)]
pub struct StreamUrls {
    host: String,
    rtmp_port: u16,
    hls_port: u16,
}

impl StreamUrls {
    #[must_use]
    pub fn new(host: impl Into<String>, rtmp_port: u16, hls_port: u16) -> Self {
        Self {
            host: host.into(),
            rtmp_port,
            hls_port,
        }
    }

    /// `rtmp://<host>:<rtmp_port>/live`
    #[must_use]
    pub fn publish_url(&self) -> String {
        format!("rtmp://{}:{}/{LIVE_APP}", self.host, self.rtmp_port)
    }

    /// `http://<host>:<hls_port>/live/<key>/index.m3u8`
    #[must_use]
    pub fn playback_url(&self, stream_key: &str) -> String {
        format!(
            "http://{}:{}/{LIVE_APP}/{stream_key}/index.m3u8",
            self.host, self.hls_port
        )
    }

    #[must_use]
    pub fn endpoints(&self, stream_key: &str) -> StreamEndpoints {
        StreamEndpoints {
            stream_key: stream_key.to_string(),
            publish_url: self.publish_url(),
            playback_url: self.playback_url(stream_key),
        }
    }

    /// Generate a new key and its endpoints
    #[must_use]
    pub fn new_endpoints(&self) -> StreamEndpoints {
        self.endpoints(&generate_stream_key())
    }
}

impl From<&StreamingConfig> for StreamUrls {
    fn from(config: &StreamingConfig) -> Self {
        Self::new(config.host.clone(), config.rtmp_port, config.hls_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::stream_key::{extract_stream_key, StreamKeyValidator};

    #[test]
    fn test_urls_follow_convention() {
        let urls = StreamUrls::new("203.0.113.7", 1935, 8000);
        assert_eq!(urls.publish_url(), "rtmp://203.0.113.7:1935/live");
        assert_eq!(
            urls.playback_url("nf_abc"),
            "http://203.0.113.7:8000/live/nf_abc/index.m3u8"
        );
    }

    #[test]
    fn test_new_endpoints_round_trip_through_validator() {
        let urls = StreamUrls::from(&StreamingConfig::default());
        let endpoints = urls.new_endpoints();

        assert_eq!(
            extract_stream_key(&endpoints.playback_url),
            Some(endpoints.stream_key.as_str())
        );
        assert!(StreamKeyValidator::new().validate(&endpoints.playback_url).is_valid);
        assert!(endpoints.publish_url.starts_with("rtmp://localhost:1935"));
    }
}
