//! `nightfall watch`: follow a live stream from the command line

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use nightfall_core::{
    bootstrap::init_database_lazy,
    models::{StreamId, ViewerId},
    playback::{HttpPlaylistProbe, PlaybackSession, SessionStatus},
    repository::{InMemoryViewerStore, ViewerRepository, ViewerStore},
    service::PresenceTracker,
    Config,
};

use crate::server::shutdown_signal;

pub struct WatchOptions {
    pub url: String,
    pub stream_id: Option<String>,
    pub viewer_id: Option<String>,
    /// Keep presence in memory instead of Postgres
    pub offline: bool,
}

/// Build the session, attaching presence only when both ids are known.
///
/// Never waits on the presence store: Postgres is connected lazily, so an
/// unreachable database only shows up as logged join failures.
pub fn build_session(config: &Config, options: WatchOptions) -> Result<PlaybackSession> {
    let WatchOptions {
        url,
        stream_id,
        viewer_id,
        offline,
    } = options;

    let probe = Arc::new(HttpPlaylistProbe::new(config.playback.probe_timeout())?);
    let session = PlaybackSession::new(url, probe, &config.playback);

    let (Some(stream_id), Some(viewer_id)) = (stream_id, viewer_id) else {
        info!("Presence tracking disabled, it needs both a stream id and a viewer id");
        return Ok(session);
    };

    let store: Arc<dyn ViewerStore> = if offline {
        Arc::new(InMemoryViewerStore::new())
    } else {
        match init_database_lazy(config) {
            Ok(pool) => Arc::new(ViewerRepository::new(pool)),
            Err(e) => {
                warn!(error = %e, "Presence store unavailable, watching without presence");
                return Ok(session);
            }
        }
    };

    Ok(session.with_presence(
        PresenceTracker::new(store),
        Some(StreamId::from(stream_id)),
        Some(ViewerId::from(viewer_id)),
    ))
}

pub async fn run_watch(config: &Config, options: WatchOptions) -> Result<()> {
    let mut session = build_session(config, options)?;

    let mut status = session.subscribe();
    let reporter = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            match &current {
                SessionStatus::Failed { reason } => warn!(%reason, "Stream unavailable"),
                other => info!(status = ?other, "Playback status changed"),
            }
            if let Ok(line) = serde_json::to_string(&current) {
                println!("{line}");
            }
        }
    });

    let token = CancellationToken::new();
    let stopper = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        stopper.cancel();
    });

    info!(url = %session.playback_url(), "Watching stream");
    let result = session.run(token).await;
    session.close().await;
    // Closing drops the status sender, which ends the reporter
    let _ = reporter.await;

    result.map_err(|e| anyhow::anyhow!(e.user_message()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nightfall_core::playback::StreamUrls;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn live_server(key: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/live/{key}/index.m3u8")))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n"))
            .mount(&server)
            .await;
        server
    }

    fn unreachable_db_config() -> Config {
        let mut config = Config::default();
        config.database.url = "postgresql://x:y@127.0.0.1:1/none".to_string();
        config.database.connect_timeout_seconds = 1;
        config.playback.poll_interval_seconds = 1;
        config.playback.probe_timeout_seconds = 2;
        config
    }

    /// Run the session until it reports Playing or the deadline passes
    async fn reaches_playing(mut session: PlaybackSession) -> bool {
        let mut status = session.subscribe();
        let token = CancellationToken::new();
        let stopper = token.clone();
        let run = tokio::spawn(async move {
            let result = session.run(token).await;
            session.close().await;
            result
        });

        let playing = tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| *s == SessionStatus::Playing),
        )
        .await
        .is_ok_and(|r| r.is_ok());

        stopper.cancel();
        let finished = run.await.unwrap();
        playing && finished.is_ok()
    }

    #[tokio::test]
    async fn test_unreachable_database_does_not_block_playback() {
        let server = live_server("nf_watch").await;
        let config = unreachable_db_config();
        let url = StreamUrls::new("127.0.0.1", 1935, server.address().port()).playback_url("nf_watch");

        let session = build_session(
            &config,
            WatchOptions {
                url,
                stream_id: Some("s1".to_string()),
                viewer_id: Some("u1".to_string()),
                offline: false,
            },
        )
        .unwrap();

        assert!(reaches_playing(session).await);
    }

    #[tokio::test]
    async fn test_single_id_plays_without_presence() {
        let server = live_server("nf_solo").await;
        let config = unreachable_db_config();
        let url = StreamUrls::new("127.0.0.1", 1935, server.address().port()).playback_url("nf_solo");

        let session = build_session(
            &config,
            WatchOptions {
                url,
                stream_id: Some("s1".to_string()),
                viewer_id: None,
                offline: false,
            },
        )
        .unwrap();

        assert!(reaches_playing(session).await);
    }

    #[tokio::test]
    async fn test_malformed_database_url_falls_back_to_no_presence() {
        let server = live_server("nf_badurl").await;
        let mut config = unreachable_db_config();
        config.database.url = "not a url".to_string();
        let url = StreamUrls::new("127.0.0.1", 1935, server.address().port()).playback_url("nf_badurl");

        let session = build_session(
            &config,
            WatchOptions {
                url,
                stream_id: Some("s1".to_string()),
                viewer_id: Some("u1".to_string()),
                offline: false,
            },
        )
        .unwrap();

        assert!(reaches_playing(session).await);
    }
}
