//! ## urverk-telemetry::logging
//! **Host-supplied log sink**
//!
//! The kernel logs through `tracing` macros only; this is the default sink
//! the CLI installs. Level resolution: explicit argument, then `RUST_LOG`,
//! then `info`.

use tracing_subscriber::fmt::format::FmtSpan;

pub struct KernelLogger;

impl KernelLogger {
    /// Installs the global subscriber. `level` overrides the environment
    /// when given (`--quiet` / `--verbose`).
    pub fn init(level: Option<&str>) {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter_layer = match level {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        };

        let fmt_layer = fmt::layer()
            .with_target(false)
            .with_span_events(FmtSpan::NONE);

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    }
}
