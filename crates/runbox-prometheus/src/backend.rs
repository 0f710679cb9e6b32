use std::sync::Arc;

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

use runbox_core::{MetricsBackend, ProvisionOutcome};

const NAMESPACE: &str = "runbox";

/// Prometheus metrics backend.
///
/// ## Label cardinality
/// All labels are bounded:
/// - `outcome`: "ready", "rejected", "timeout", "terminated", "failed"
/// - `reason`: "session_end", "abandoned", "stale", "orphan"
/// - `kind`: "stale", "orphan" for sweeps, an error category for errors
/// - `component`: "attacher", "destroyer", "reconciler"
#[derive(Clone)]
pub struct PrometheusMetrics {
    provisions: CounterVec,
    provision_duration: HistogramVec,
    destroys: CounterVec,
    sweeps: CounterVec,
    sweep_removed: CounterVec,
    errors: CounterVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let provisions = CounterVec::new(
            Opts::new("provisions_total", "Finished provisioning attempts").namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(provisions.clone()))?;

        // Pod scheduling plus image pull dominates; the default ready timeout is two minutes.
        let provision_duration = HistogramVec::new(
            HistogramOpts::new(
                "provision_duration_seconds",
                "Time from the first create call to a final provisioning answer",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(provision_duration.clone()))?;

        let destroys = CounterVec::new(
            Opts::new("destroys_total", "Destroyed runners").namespace(NAMESPACE),
            &["reason"],
        )?;
        registry.register(Box::new(destroys.clone()))?;

        let sweeps = CounterVec::new(
            Opts::new("sweeps_total", "Completed reconciler sweeps").namespace(NAMESPACE),
            &["kind"],
        )?;
        registry.register(Box::new(sweeps.clone()))?;

        let sweep_removed = CounterVec::new(
            Opts::new("sweep_removed_total", "Runners removed by reconciler sweeps")
                .namespace(NAMESPACE),
            &["kind"],
        )?;
        registry.register(Box::new(sweep_removed.clone()))?;

        let errors = CounterVec::new(
            Opts::new("errors_total", "Failed cluster interactions").namespace(NAMESPACE),
            &["component", "kind"],
        )?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            provisions,
            provision_duration,
            destroys,
            sweeps,
            sweep_removed,
            errors,
            registry,
        })
    }

    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Render every metric in the text exposition format.
    ///
    /// Returns the body and its content type.
    pub fn encode(&self) -> Result<(Vec<u8>, String), prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.gather(), &mut buf)?;
        Ok((buf, encoder.format_type().to_string()))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_provision(&self, outcome: ProvisionOutcome, duration_ms: u64) {
        let label = outcome.as_label();
        self.provisions.with_label_values(&[label]).inc();
        self.provision_duration
            .with_label_values(&[label])
            .observe(duration_ms as f64 / 1000.0);
    }

    fn record_destroy(&self, reason: &str) {
        self.destroys.with_label_values(&[reason]).inc();
    }

    fn record_sweep(&self, kind: &str, removed: u64) {
        self.sweeps.with_label_values(&[kind]).inc();
        self.sweep_removed
            .with_label_values(&[kind])
            .inc_by(removed as f64);
    }

    fn record_error(&self, component: &str, kind: &str) {
        self.errors.with_label_values(&[component, kind]).inc();
    }
}
