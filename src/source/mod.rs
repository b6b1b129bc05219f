pub mod deadletter;
pub mod memory;
pub mod traits;

pub use deadletter::{DeadLetterRecord, LoggingDeadLetterSink, MemoryDeadLetterSink};
pub use memory::MemorySource;
pub use traits::{DeadLetterSink, MessageSource};
