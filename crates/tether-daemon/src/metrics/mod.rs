mod collector;
mod prometheus;

pub use collector::DaemonMetrics;
pub use prometheus::{render, MetricsSnapshot, PrometheusExporter};
