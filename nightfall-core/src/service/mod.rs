pub mod media_dir;
pub mod presence;

pub use media_dir::{MediaDirectory, StreamCounts};
pub use presence::{PresenceGuard, PresenceState, PresenceTracker, ViewerPresence};
