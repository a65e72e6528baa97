//! # urverk-telemetry
//!
//! Logging and metrics for the kernel host: a `tracing` subscriber setup and
//! a Prometheus recorder fed from run summaries.

pub mod logging;
pub mod metrics;

pub use logging::KernelLogger;
pub use metrics::MetricsRecorder;
