//! Flush runtime: the double buffer, its daemon and the steps of a cycle.

pub mod buffer;
pub mod committer;
pub mod metrics;
pub mod splitter;
pub mod watermark;

pub mod prelude {
    pub use super::buffer::{DaemonState, DoubleBuffer};
    pub use super::metrics::{FlushMetrics, HealthState, HealthStatus, MetricsSnapshot};
    pub use super::splitter::{split_runs, Run, RunKind};
    pub use super::watermark::{Notification, WatermarkNotifier};
}
