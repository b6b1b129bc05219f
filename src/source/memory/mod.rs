mod core;
mod queue;

pub use self::core::{DEFAULT_VISIBILITY_WINDOW, MemorySource};
