use crate::metrics::backend::{MetricsBackend, ProvisionOutcome};

/// No-op metrics backend that compiles to nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsBackend for NoOpMetrics {
    #[inline(always)]
    fn record_provision(&self, _: ProvisionOutcome, _: u64) {}

    #[inline(always)]
    fn record_destroy(&self, _: &str) {}

    #[inline(always)]
    fn record_sweep(&self, _: &str, _: u64) {}

    #[inline(always)]
    fn record_error(&self, _: &str, _: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_metrics_is_zero_size() {
        assert_eq!(std::mem::size_of::<NoOpMetrics>(), 0);
    }

    #[test]
    fn outcome_labels_are_distinct() {
        let labels = [
            ProvisionOutcome::Ready,
            ProvisionOutcome::Rejected,
            ProvisionOutcome::Timeout,
            ProvisionOutcome::Terminated,
            ProvisionOutcome::Failed,
        ]
        .map(|o| o.as_label());
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }
}
