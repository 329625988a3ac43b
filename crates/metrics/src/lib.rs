//! Metrics for trinity.
//!
//! Crates record through the `metrics` facade macros re-exported here, gated
//! behind their own `metrics` feature. With the `prometheus` feature the
//! binary installs a Prometheus recorder and can render a text snapshot.
//!
//! ```rust,ignore
//! use trinity_metrics::{counter, pipeline};
//!
//! counter!(pipeline::RUNS_TOTAL).increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
