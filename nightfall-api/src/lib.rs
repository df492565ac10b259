// Nightfall API Library
//
// HTTP endpoints for stream keys, viewer presence and health

pub mod http;

pub use http::{create_router, AppState};
