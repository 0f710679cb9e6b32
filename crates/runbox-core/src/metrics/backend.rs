use std::sync::Arc;

/// Provisioning outcome for metrics classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Unit reached `Running`.
    Ready,
    /// Credential or unit creation was rejected.
    Rejected,
    /// Unit did not become ready before the deadline.
    Timeout,
    /// Unit reached a terminal phase while waiting.
    Terminated,
    /// Status read failed while waiting.
    Failed,
}

impl ProvisionOutcome {
    /// Return label value for metrics.
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            ProvisionOutcome::Ready => "ready",
            ProvisionOutcome::Rejected => "rejected",
            ProvisionOutcome::Timeout => "timeout",
            ProvisionOutcome::Terminated => "terminated",
            ProvisionOutcome::Failed => "failed",
        }
    }
}

/// Backend metrics collection interface.
///
/// All label arguments are short static identifiers; runner ids and origins are never passed
/// to keep cardinality bounded.
pub trait MetricsBackend: Send + Sync + 'static {
    /// Record one finished provisioning attempt.
    ///
    /// # Arguments
    /// - `outcome`: How the attempt ended
    /// - `duration_ms`: Time from first create call to the final answer
    fn record_provision(&self, outcome: ProvisionOutcome, duration_ms: u64);
    /// Record a destroyed runner.
    ///
    /// # Arguments
    /// - `reason`: Why it was destroyed (`session_end`, `stale`, `orphan`, ...)
    fn record_destroy(&self, reason: &str);
    /// Record one reconciler sweep.
    ///
    /// # Arguments
    /// - `kind`: Sweep kind (`stale` or `orphan`)
    /// - `removed`: Runners destroyed by this sweep
    fn record_sweep(&self, kind: &str, removed: u64);
    /// Record a failed cluster interaction.
    ///
    /// # Arguments
    /// - `component`: Which component hit it (`provisioner`, `reconciler`, ...)
    /// - `kind`: Error category
    fn record_error(&self, component: &str, kind: &str);
}

/// Shared handle to metrics backend.
pub type MetricsHandle = Arc<dyn MetricsBackend>;
