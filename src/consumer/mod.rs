pub mod builder;
pub mod runner;

pub use builder::ConsumerBuilder;
pub use runner::Consumer;
