pub mod discovery;
pub mod generator;
pub mod gestures;

pub use discovery::Category;
pub use generator::{InteractionGenerator, DEFAULT_INTERVAL_MS};
pub use gestures::{FallbackKind, Gesture};
