pub mod builder;
pub mod context;
pub mod core;
pub mod metrics;
pub mod pacemaker;
pub mod plugin;
pub mod plugins;
pub mod pool;
pub mod tracker;

pub use self::core::Dispatcher;
pub use builder::DispatcherBuilder;
pub use context::DispatcherContext;
pub use metrics::{ConsumerMetrics, MetricsSnapshot};
pub use pacemaker::{PacemakerEvent, PullPacemaker};
pub use plugin::{ConsumerPlugin, NoOpPlugin};
pub use pool::{HANDLER_FAULT, PROCESSING_TIMEOUT, Submission, WorkerPool, WorkerSlot};
pub use tracker::{Admission, DeliveryTracker, InFlightEntry};
