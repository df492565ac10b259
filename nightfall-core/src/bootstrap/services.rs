//! Service initialization and dependency injection

use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use crate::{
    playback::StreamUrls,
    repository::{ViewerRepository, ViewerStore},
    service::{MediaDirectory, PresenceTracker},
    Config,
};

/// Container for all initialized services
#[derive(Clone)]
pub struct Services {
    /// Viewer presence bookkeeping
    pub presence_tracker: PresenceTracker,
    /// Store behind the presence tracker
    pub viewer_store: Arc<dyn ViewerStore>,
    /// HLS output directory of the media server
    pub media_directory: MediaDirectory,
    /// Publish/playback URL builder
    pub stream_urls: StreamUrls,
}

impl Services {
    /// Wire services around an already constructed presence store
    #[must_use]
    pub fn with_store(viewer_store: Arc<dyn ViewerStore>, config: &Config) -> Self {
        Self {
            presence_tracker: PresenceTracker::new(viewer_store.clone()),
            viewer_store,
            media_directory: MediaDirectory::new(&config.streaming.media_root),
            stream_urls: StreamUrls::from(&config.streaming),
        }
    }
}

/// Initialize all core services against Postgres
pub async fn init_services(pool: PgPool, config: &Config) -> anyhow::Result<Services> {
    let services = Services::with_store(Arc::new(ViewerRepository::new(pool)), config);

    services.media_directory.ensure().await?;
    info!(
        media_root = %services.media_directory.root().display(),
        publish_url = %services.stream_urls.publish_url(),
        "Core services initialized"
    );

    Ok(services)
}
