pub mod memory;
pub mod viewer;

pub use memory::InMemoryViewerStore;
pub use viewer::{ViewerRepository, ViewerStore};
