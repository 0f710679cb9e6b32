use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{Span, debug, info, instrument, trace, warn};

use runbox_model::{
    CONTAINER_NAME, CREDENTIAL_KEY, ComputeUnit, Credential, CredentialSpec, ENV_ACCESS_TOKEN,
    ENV_REPO_BRANCH, ENV_REPO_URL, Env, EnvVar, ProvisionRequest, RunnerId, RunnerInstance,
    TimeoutMs, UnitPhase, UnitSpec, UnitTemplate, selector,
};

use crate::{
    cluster::{Cluster, ClusterError, ResourceKind},
    error::OrchestratorError,
    metrics::{MetricsHandle, ProvisionOutcome, noop_metrics},
    registry::Registry,
};

/// Provisioner settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProvisionerConfig {
    /// Image and resource limits of every unit.
    pub template: UnitTemplate,
    /// Delay between two status reads while waiting for readiness.
    pub poll_interval_ms: TimeoutMs,
    /// Overall readiness deadline.
    pub ready_timeout_ms: TimeoutMs,
    /// Fresh ids tried before giving up on a collision.
    pub id_attempts: u32,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            template: UnitTemplate::default(),
            poll_interval_ms: 500,
            ready_timeout_ms: 120_000,
            id_attempts: 3,
        }
    }
}

type IdSource = Arc<dyn Fn() -> RunnerId + Send + Sync>;

/// Creates runners: credential first, then the compute unit, then waits for `Running`.
///
/// Never rolls back. Whatever a failed attempt leaves behind is tagged and gets
/// removed by the [`crate::Reconciler`].
#[derive(Clone)]
pub struct Provisioner {
    cluster: Arc<dyn Cluster>,
    registry: Registry,
    config: ProvisionerConfig,
    metrics: MetricsHandle,
    ids: IdSource,
}

impl Provisioner {
    pub fn new(cluster: Arc<dyn Cluster>, config: ProvisionerConfig) -> Self {
        Self {
            registry: Registry::new(cluster.clone()),
            cluster,
            config,
            metrics: noop_metrics(),
            ids: Arc::new(RunnerId::generate),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the random id generator.
    pub fn with_id_source<F>(mut self, ids: F) -> Self
    where
        F: Fn() -> RunnerId + Send + Sync + 'static,
    {
        self.ids = Arc::new(ids);
        self
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// Create a runner for `req` and block until its unit is `Running`.
    #[instrument(name = "provision", skip_all, fields(origin = %req.origin, runner = tracing::field::Empty))]
    pub async fn provision(
        &self,
        req: &ProvisionRequest,
    ) -> Result<RunnerInstance, OrchestratorError> {
        let started = Instant::now();
        let res = self.provision_inner(req).await;

        let outcome = match &res {
            Ok(_) => ProvisionOutcome::Ready,
            Err(OrchestratorError::Timeout { .. }) => ProvisionOutcome::Timeout,
            Err(OrchestratorError::Terminated { .. }) => ProvisionOutcome::Terminated,
            Err(OrchestratorError::Create { .. }) => ProvisionOutcome::Rejected,
            Err(_) => ProvisionOutcome::Failed,
        };
        let elapsed = started.elapsed().as_millis() as u64;
        self.metrics.record_provision(outcome, elapsed);

        match &res {
            Ok(runner) => info!(%runner, elapsed_ms = elapsed, "runner ready"),
            Err(e) => warn!(error = %e, elapsed_ms = elapsed, "provisioning failed"),
        }
        res
    }

    async fn provision_inner(
        &self,
        req: &ProvisionRequest,
    ) -> Result<RunnerInstance, OrchestratorError> {
        let id = self.allocate_id().await?;
        Span::current().record("runner", tracing::field::display(&id));

        let credential = self.create_credential(&id, req).await?;
        let unit = self.create_unit(&id, req).await?;
        debug!(unit = %unit.name, credential = %credential.name, "objects created");

        let unit = self.wait_ready(&id, &unit.name).await?;
        Ok(RunnerInstance {
            id,
            unit: Some(unit),
            credential: Some(credential),
        })
    }

    /// Draw ids until one is not carried by any object.
    async fn allocate_id(&self) -> Result<RunnerId, OrchestratorError> {
        let attempts = self.config.id_attempts.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            let id = (self.ids)();
            if self.registry.resolve(&id).await?.is_gone() {
                return Ok(id);
            }
            warn!(runner = %id, attempt, "runner id already in use");
            last = Some(id);
        }

        let name = last.map(|id| id.unit_name()).unwrap_or_default();
        Err(OrchestratorError::Create {
            kind: ResourceKind::Unit,
            name: name.clone(),
            source: ClusterError::AlreadyExists {
                kind: ResourceKind::Unit,
                name,
            },
        })
    }

    async fn create_credential(
        &self,
        id: &RunnerId,
        req: &ProvisionRequest,
    ) -> Result<Credential, OrchestratorError> {
        let spec = CredentialSpec {
            name: id.credential_name(),
            labels: selector::credential_labels(id),
            key: CREDENTIAL_KEY.to_string(),
            token: req.token.clone(),
        };
        self.cluster
            .create_credential(&spec)
            .await
            .map_err(|source| OrchestratorError::Create {
                kind: ResourceKind::Credential,
                name: spec.name.clone(),
                source,
            })
    }

    async fn create_unit(
        &self,
        id: &RunnerId,
        req: &ProvisionRequest,
    ) -> Result<ComputeUnit, OrchestratorError> {
        let spec = unit_spec(id, req, &self.config.template);
        self.cluster
            .create_unit(&spec)
            .await
            .map_err(|source| OrchestratorError::Create {
                kind: ResourceKind::Unit,
                name: spec.name.clone(),
                source,
            })
    }

    /// Wait for the unit to be `Running`, bounded by `ready_timeout_ms`.
    async fn wait_ready(&self, id: &RunnerId, name: &str) -> Result<ComputeUnit, OrchestratorError> {
        let deadline = Duration::from_millis(self.config.ready_timeout_ms);
        time::timeout(deadline, self.poll_until_ready(id, name))
            .await
            .map_err(|_| OrchestratorError::Timeout {
                id: id.clone(),
                timeout_ms: self.config.ready_timeout_ms,
            })?
    }

    /// Read the unit every `poll_interval_ms` until it is `Running` or terminal.
    async fn poll_until_ready(
        &self,
        id: &RunnerId,
        name: &str,
    ) -> Result<ComputeUnit, OrchestratorError> {
        let mut ticker = time::interval(Duration::from_millis(self.config.poll_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let unit = self
                .cluster
                .get_unit(name)
                .await
                .map_err(OrchestratorError::Lookup)?;

            match unit.phase {
                UnitPhase::Running => return Ok(unit),
                phase if phase.is_terminal() => {
                    return Err(OrchestratorError::Terminated {
                        id: id.clone(),
                        phase,
                    });
                }
                phase => trace!(%phase, "waiting for unit"),
            }
        }
    }
}

/// Unit spec for runner `id`. The token is referenced from the credential, never inlined.
fn unit_spec(id: &RunnerId, req: &ProvisionRequest, template: &UnitTemplate) -> UnitSpec {
    let mut env = Env::new();
    env.push(EnvVar::value(ENV_REPO_URL, req.clone_url.as_str()));
    env.push(EnvVar::value(ENV_REPO_BRANCH, req.branch.as_str()));
    env.push(EnvVar::secret_key(
        ENV_ACCESS_TOKEN,
        id.credential_name(),
        CREDENTIAL_KEY,
    ));

    UnitSpec {
        name: id.unit_name(),
        labels: selector::unit_labels(id, &req.origin),
        container: CONTAINER_NAME.to_string(),
        template: template.clone(),
        env,
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use runbox_model::{
        AccessToken, EnvSource, LABEL_RUNNER_ID, LABEL_RUNNER_ORIGIN, LABEL_RUNNER_TYPE,
        Origin, RUNNER_TYPE_CREDS, RUNNER_TYPE_UNIT, selector::credential_labels,
    };

    use super::*;
    use crate::cluster::{FakeCluster, FakeOp, Rollout};

    fn request() -> ProvisionRequest {
        ProvisionRequest::new(
            "https://github.com/acme/tool.git",
            "feature/x",
            Origin::new("10.0.0.5:51322").unwrap(),
            AccessToken::new("tok-123"),
        )
    }

    fn provisioner(fake: &FakeCluster) -> Provisioner {
        Provisioner::new(Arc::new(fake.clone()), ProvisionerConfig::default())
    }

    fn fixed_ids(ids: &[&str]) -> impl Fn() -> RunnerId + Send + Sync + 'static {
        let queue: Mutex<VecDeque<RunnerId>> =
            Mutex::new(ids.iter().map(|s| RunnerId::new(*s).unwrap()).collect());
        move || queue.lock().unwrap().pop_front().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn ready_within_two_seconds_returns_populated_runner() {
        let fake = FakeCluster::new();
        // Running on the fifth read: t = 0, 0.5, 1.0, 1.5 pending, 2.0 running.
        fake.set_rollout(Rollout::After {
            reads: 4,
            phase: UnitPhase::Running,
        });

        let started = Instant::now();
        let runner = provisioner(&fake).provision(&request()).await.unwrap();
        assert!(started.elapsed() <= Duration::from_secs(3));

        let unit = runner.unit.as_ref().unwrap();
        let credential = runner.credential.as_ref().unwrap();
        assert_eq!(unit.phase, UnitPhase::Running);
        assert_eq!(unit.runner_id(), Some(runner.id.clone()));
        assert_eq!(credential.runner_id(), Some(runner.id.clone()));
        assert_eq!(fake.calls(FakeOp::GetUnit), 5);
    }

    #[tokio::test]
    async fn objects_carry_labels_env_and_token() {
        let fake = FakeCluster::new();
        let p = provisioner(&fake).with_id_source(fixed_ids(&["ab12cd34ef"]));
        p.provision(&request()).await.unwrap();

        let spec = fake.unit_spec("runner-ab12cd34ef").unwrap();
        assert_eq!(spec.container, "runner");
        assert_eq!(spec.labels.get(LABEL_RUNNER_ID), Some("ab12cd34ef"));
        assert_eq!(spec.labels.get(LABEL_RUNNER_TYPE), Some(RUNNER_TYPE_UNIT));
        assert_eq!(spec.labels.get(LABEL_RUNNER_ORIGIN), Some("10.0.0.5_51322"));
        assert_eq!(
            spec.env.get(ENV_REPO_URL),
            Some(&EnvSource::Value("https://github.com/acme/tool.git".into()))
        );
        assert_eq!(
            spec.env.get(ENV_REPO_BRANCH),
            Some(&EnvSource::Value("feature/x".into()))
        );
        assert_eq!(
            spec.env.get(ENV_ACCESS_TOKEN),
            Some(&EnvSource::SecretKey {
                name: "runner-secrets-ab12cd34ef".into(),
                key: CREDENTIAL_KEY.into()
            })
        );

        let token = fake.credential_token("runner-secrets-ab12cd34ef").unwrap();
        assert_eq!(token.expose(), "tok-123");
        assert_eq!(
            credential_labels(&RunnerId::new("ab12cd34ef").unwrap()).get(LABEL_RUNNER_TYPE),
            Some(RUNNER_TYPE_CREDS)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn never_ready_times_out_and_leaks_for_the_reconciler() {
        let fake = FakeCluster::new();
        fake.set_rollout(Rollout::Never);

        let started = Instant::now();
        let err = provisioner(&fake).provision(&request()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Timeout { timeout_ms: 120_000, .. }));
        assert!(started.elapsed() >= Duration::from_secs(120));

        let leaked = Registry::new(Arc::new(fake.clone()))
            .aggregate_all()
            .await
            .unwrap();
        assert_eq!(leaked.len(), 1);
        assert!(leaked[0].is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_phase_fails_fast() {
        let fake = FakeCluster::new();
        fake.set_rollout(Rollout::After {
            reads: 1,
            phase: UnitPhase::Failed,
        });

        let started = Instant::now();
        let err = provisioner(&fake).provision(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Terminated {
                phase: UnitPhase::Failed,
                ..
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(fake.unit_names().len(), 1);
    }

    #[tokio::test]
    async fn credential_failure_stops_before_the_unit() {
        let fake = FakeCluster::new();
        fake.fail(FakeOp::CreateCredential);

        let err = provisioner(&fake).provision(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Create {
                kind: ResourceKind::Credential,
                ..
            }
        ));
        assert_eq!(fake.calls(FakeOp::CreateUnit), 0);
    }

    #[tokio::test]
    async fn unit_failure_keeps_the_credential() {
        let fake = FakeCluster::new();
        fake.fail(FakeOp::CreateUnit);

        let err = provisioner(&fake).provision(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Create {
                kind: ResourceKind::Unit,
                ..
            }
        ));
        assert_eq!(fake.credential_names().len(), 1);
        assert_eq!(fake.calls(FakeOp::DeleteCredential), 0);
    }

    #[tokio::test]
    async fn status_read_failure_is_a_lookup_error() {
        let fake = FakeCluster::new();
        fake.fail(FakeOp::GetUnit);

        let err = provisioner(&fake).provision(&request()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Lookup(_)));
    }

    #[tokio::test]
    async fn colliding_id_is_redrawn() {
        let fake = FakeCluster::new();
        let taken = RunnerId::new("aaaaaaaaaa").unwrap();
        fake.insert_credential(Credential {
            name: taken.credential_name(),
            labels: credential_labels(&taken),
        });

        let p = provisioner(&fake).with_id_source(fixed_ids(&["aaaaaaaaaa", "bbbbbbbbbb"]));
        let runner = p.provision(&request()).await.unwrap();
        assert_eq!(runner.id.as_str(), "bbbbbbbbbb");
    }

    #[tokio::test]
    async fn gives_up_after_configured_attempts() {
        let fake = FakeCluster::new();
        let taken = RunnerId::new("aaaaaaaaaa").unwrap();
        fake.insert_credential(Credential {
            name: taken.credential_name(),
            labels: credential_labels(&taken),
        });

        let p = provisioner(&fake)
            .with_id_source(fixed_ids(&["aaaaaaaaaa", "aaaaaaaaaa", "aaaaaaaaaa"]));
        let err = p.provision(&request()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Create { .. }));
        assert_eq!(fake.calls(FakeOp::CreateCredential), 0);
    }

    #[test]
    fn config_defaults() {
        let cfg: ProvisionerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, ProvisionerConfig::default());
        assert_eq!(cfg.poll_interval_ms, 500);
        assert_eq!(cfg.ready_timeout_ms, 120_000);
        assert_eq!(cfg.id_attempts, 3);
    }
}
