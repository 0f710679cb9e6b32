use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use runbox_model::RunnerInstance;

use crate::{
    cluster::{Cluster, ClusterError},
    error::OrchestratorError,
    metrics::{MetricsHandle, noop_metrics},
};

/// How the two deletions of a runner relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyPolicy {
    /// Delete the unit, then the credential. A failed unit deletion leaves the credential alone.
    #[default]
    Sequential,
    /// Attempt both deletions and report every failure together.
    Independent,
}

/// Why a runner is being destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    /// Its session ended.
    SessionEnd,
    /// Its session's lease was dropped without an explicit release.
    Abandoned,
    /// Too old or in a terminal phase.
    Stale,
    /// Only one of its two objects exists.
    Orphan,
}

impl DestroyReason {
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            DestroyReason::SessionEnd => "session_end",
            DestroyReason::Abandoned => "abandoned",
            DestroyReason::Stale => "stale",
            DestroyReason::Orphan => "orphan",
        }
    }
}

/// Deletes the objects of a runner. Objects that are already gone count as deleted.
#[derive(Clone)]
pub struct Destroyer {
    cluster: Arc<dyn Cluster>,
    policy: DestroyPolicy,
    metrics: MetricsHandle,
}

impl Destroyer {
    pub fn new(cluster: Arc<dyn Cluster>, policy: DestroyPolicy) -> Self {
        Self {
            cluster,
            policy,
            metrics: noop_metrics(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn policy(&self) -> DestroyPolicy {
        self.policy
    }

    /// Delete whichever objects `runner` holds. A runner holding none is a no-op.
    #[instrument(name = "destroy", skip_all, fields(runner = %runner.id, reason = reason.as_label()))]
    pub async fn destroy(
        &self,
        runner: &RunnerInstance,
        reason: DestroyReason,
    ) -> Result<(), OrchestratorError> {
        if runner.is_gone() {
            debug!("nothing to delete");
            return Ok(());
        }

        let failures = match self.policy {
            DestroyPolicy::Sequential => self.sequential(runner).await,
            DestroyPolicy::Independent => self.independent(runner).await,
        };

        if failures.is_empty() {
            info!(%runner, "runner destroyed");
            self.metrics.record_destroy(reason.as_label());
            Ok(())
        } else {
            self.metrics.record_error("destroyer", "destroy");
            let err = OrchestratorError::Destroy {
                id: runner.id.clone(),
                failures,
            };
            warn!(error = %err, "destroy incomplete");
            Err(err)
        }
    }

    async fn sequential(&self, runner: &RunnerInstance) -> Vec<ClusterError> {
        if let Some(err) = self.delete_unit(runner).await {
            return vec![err];
        }
        self.delete_credential(runner).await.into_iter().collect()
    }

    async fn independent(&self, runner: &RunnerInstance) -> Vec<ClusterError> {
        let (unit, credential) =
            tokio::join!(self.delete_unit(runner), self.delete_credential(runner));
        unit.into_iter().chain(credential).collect()
    }

    async fn delete_unit(&self, runner: &RunnerInstance) -> Option<ClusterError> {
        let unit = runner.unit.as_ref()?;
        absent_is_ok(self.cluster.delete_unit(&unit.name).await)
    }

    async fn delete_credential(&self, runner: &RunnerInstance) -> Option<ClusterError> {
        let credential = runner.credential.as_ref()?;
        absent_is_ok(self.cluster.delete_credential(&credential.name).await)
    }
}

fn absent_is_ok(res: Result<(), ClusterError>) -> Option<ClusterError> {
    match res {
        Ok(()) => None,
        Err(e) if e.is_not_found() => {
            debug!(error = %e, "already gone");
            None
        }
        Err(e) => Some(e),
    }
}
