//! Client-side playback reliability for HLS live streams

pub mod probe;
pub mod retry;
pub mod session;
pub mod stream_key;
pub mod urls;

pub use probe::{HttpPlaylistProbe, PlaylistProbe};
pub use retry::{RetryController, RetryPolicy};
pub use session::{PlaybackSession, SessionStatus};
pub use stream_key::{
    extract_stream_key, generate_stream_key, StreamKeyValidation, StreamKeyValidator,
    STREAM_KEY_PREFIX,
};
pub use urls::{StreamEndpoints, StreamUrls};
