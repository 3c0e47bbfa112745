//! Metrics collection and export for cadence.
//!
//! Metric names live in [`jobs`]; record them through the re-exported
//! `metrics` facade macros. With the `prometheus` feature the recorder renders
//! the Prometheus text format, otherwise everything is discarded.
//!
//! ```rust,ignore
//! use cadence_metrics::{counter, jobs};
//!
//! counter!(jobs::EXECUTIONS_TOTAL, "job" => "nightly-report").increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
