//! Metrics for solace.
//!
//! Metric names live in per-concern modules and are recorded through the
//! `metrics` facade macros re-exported here. Without an installed recorder
//! every call is a no-op.
//!
//! # Usage
//!
//! ```rust,ignore
//! use solace_metrics::{backup, counter, labels};
//!
//! counter!(backup::EXPORTS_TOTAL, labels::FORMAT => "encrypted").increment(1);
//! ```
//!
//! # Features
//!
//! - `prometheus`: install a Prometheus recorder so [`MetricsHandle::render`]
//!   returns the text exposition format

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
