use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use runbox_model::{Origin, ProvisionRequest, RunnerId, RunnerInstance};

use crate::{
    admission::{AdmissionConfig, AdmissionController},
    attach::Attacher,
    cluster::Cluster,
    destroy::{DestroyPolicy, DestroyReason, Destroyer},
    error::OrchestratorError,
    metrics::{MetricsHandle, noop_metrics},
    provision::{Provisioner, ProvisionerConfig},
    reconcile::{Reconciler, ReconcilerConfig, ReconcilerHandle, SweepReport},
    registry::Registry,
    session::RunnerLease,
};

/// Settings of every orchestrator component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrchestratorConfig {
    pub provisioner: ProvisionerConfig,
    pub reconciler: ReconcilerConfig,
    pub admission: AdmissionConfig,
    pub destroy_policy: DestroyPolicy,
}

/// Facade wiring all components over one shared [`Cluster`].
///
/// Cheap to clone; holds no runner state of its own.
#[derive(Clone)]
pub struct Orchestrator {
    cluster: Arc<dyn Cluster>,
    registry: Registry,
    provisioner: Provisioner,
    attacher: Attacher,
    destroyer: Destroyer,
    admission: AdmissionController,
    reconciler: Reconciler,
}

impl Orchestrator {
    pub fn new(cluster: Arc<dyn Cluster>, config: OrchestratorConfig) -> Self {
        Self::with_metrics(cluster, config, noop_metrics())
    }

    pub fn with_metrics(
        cluster: Arc<dyn Cluster>,
        config: OrchestratorConfig,
        metrics: MetricsHandle,
    ) -> Self {
        let registry = Registry::new(cluster.clone());
        let destroyer =
            Destroyer::new(cluster.clone(), config.destroy_policy).with_metrics(metrics.clone());
        let provisioner =
            Provisioner::new(cluster.clone(), config.provisioner).with_metrics(metrics.clone());
        let attacher = Attacher::new(cluster.clone()).with_metrics(metrics.clone());
        let admission = AdmissionController::new(cluster.clone(), config.admission);
        let reconciler = Reconciler::new(
            cluster.clone(),
            registry.clone(),
            destroyer.clone(),
            config.reconciler,
        )
        .with_metrics(metrics);

        Self {
            cluster,
            registry,
            provisioner,
            attacher,
            destroyer,
            admission,
            reconciler,
        }
    }

    /// Replace the provisioner's id generator.
    pub fn with_id_source<F>(mut self, ids: F) -> Self
    where
        F: Fn() -> RunnerId + Send + Sync + 'static,
    {
        self.provisioner = self.provisioner.with_id_source(ids);
        self
    }

    /// Get-or-create the resource scope. Failure here is fatal at startup.
    pub async fn ensure_scope(&self) -> Result<(), OrchestratorError> {
        self.cluster
            .ensure_scope()
            .await
            .map_err(|e| OrchestratorError::Config(format!("cannot prepare runner scope: {e}")))?;
        info!("runner scope ready");
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn destroyer(&self) -> &Destroyer {
        &self.destroyer
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub async fn can_provision(&self, origin: &Origin) -> Result<bool, OrchestratorError> {
        self.admission.can_provision(origin).await
    }

    pub async fn provision(
        &self,
        req: &ProvisionRequest,
    ) -> Result<RunnerInstance, OrchestratorError> {
        self.provisioner.provision(req).await
    }

    /// Provision and wrap the result so it is destroyed on every exit path.
    pub async fn provision_lease(
        &self,
        req: &ProvisionRequest,
    ) -> Result<RunnerLease, OrchestratorError> {
        let runner = self.provisioner.provision(req).await?;
        Ok(RunnerLease::new(runner, self.destroyer.clone()))
    }

    pub async fn attach<S>(&self, runner: &RunnerInstance, io: S) -> Result<(), OrchestratorError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        self.attacher.attach(runner, io).await
    }

    pub async fn destroy(
        &self,
        runner: &RunnerInstance,
        reason: DestroyReason,
    ) -> Result<(), OrchestratorError> {
        self.destroyer.destroy(runner, reason).await
    }

    /// Run one reconciler tick now.
    pub async fn sweep(&self) -> SweepReport {
        self.reconciler.sweep().await
    }

    /// Start the background reconciler on the current runtime.
    pub fn spawn_reconciler(&self) -> ReconcilerHandle {
        self.reconciler.clone().spawn()
    }
}

#[cfg(test)]
mod tests {
    use runbox_model::AccessToken;

    use super::*;
    use crate::cluster::{FakeCluster, FakeOp};

    fn orchestrator(fake: &FakeCluster) -> Orchestrator {
        Orchestrator::new(Arc::new(fake.clone()), OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn ensure_scope_failure_is_a_config_error() {
        let fake = FakeCluster::new();
        orchestrator(&fake).ensure_scope().await.unwrap();
        assert!(fake.scope_ready());

        let broken = FakeCluster::new();
        broken.fail(FakeOp::EnsureScope);
        let err = orchestrator(&broken).ensure_scope().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
    }

    #[tokio::test]
    async fn provision_then_destroy_leaves_nothing_behind() {
        let fake = FakeCluster::new();
        let orch = orchestrator(&fake);
        let req = ProvisionRequest::new(
            "https://github.com/acme/tool.git",
            "main",
            Origin::new("10.0.0.5").unwrap(),
            AccessToken::new("t"),
        );

        let runner = orch.provision(&req).await.unwrap();
        assert_eq!(orch.registry().resolve(&runner.id).await.unwrap(), runner);

        orch.destroy(&runner, DestroyReason::SessionEnd).await.unwrap();
        assert!(orch.registry().aggregate_all().await.unwrap().is_empty());
    }

    #[test]
    fn config_accepts_partial_json() {
        let cfg: OrchestratorConfig = serde_json::from_str(
            r#"{"admission":{"maxConcurrent":5},"destroyPolicy":"independent"}"#,
        )
        .unwrap();
        assert_eq!(cfg.admission.max_concurrent, 5);
        assert_eq!(cfg.destroy_policy, DestroyPolicy::Independent);
        assert_eq!(cfg.reconciler, ReconcilerConfig::default());
    }
}
