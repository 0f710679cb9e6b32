//! Prometheus backend for the runner orchestrator.
//!
//! [`PrometheusMetrics`] implements [`runbox_core::MetricsBackend`]; hand it to
//! [`runbox_core::Orchestrator::with_metrics`] and serve [`PrometheusMetrics::encode`]
//! from whatever HTTP stack the binary already runs.
//!
//! ## Metrics
//! - `runbox_provisions_total{outcome}` - Counter
//! - `runbox_provision_duration_seconds{outcome}` - Histogram
//! - `runbox_destroys_total{reason}` - Counter
//! - `runbox_sweep_removed_total{kind}` - Counter
//! - `runbox_sweeps_total{kind}` - Counter
//! - `runbox_errors_total{component, kind}` - Counter

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
