pub mod metrics;

pub use metrics::MetricsPlugin;
