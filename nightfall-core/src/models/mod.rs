pub mod id;
pub mod viewer;

pub use id::{generate_id, StreamId, ViewerId, ViewerRecordId};
pub use viewer::{
    JoinStreamRequest, JoinStreamResponse, LeaveStreamRequest, ViewerCountResponse, ViewerRecord,
};
