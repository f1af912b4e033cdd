//! Session artifacts and the store that owns them.

pub mod probe;
pub mod store;
pub mod types;

pub use probe::FetchedImage;
pub use store::{ArtifactStore, SessionState};
pub use types::*;
