use std::{collections::BTreeSet, sync::Arc};

use tracing::{debug, warn};

use runbox_model::{RunnerId, RunnerInstance, selector};

use crate::{cluster::Cluster, error::OrchestratorError};

/// Two-kind join of compute units and credentials keyed by runner id.
///
/// Stateless: every call goes to the cluster and returns a point-in-time snapshot.
#[derive(Clone)]
pub struct Registry {
    cluster: Arc<dyn Cluster>,
}

impl Registry {
    pub fn new(cluster: Arc<dyn Cluster>) -> Self {
        Self { cluster }
    }

    /// Snapshot of the runner `id`. Missing objects are `None`, not an error.
    pub async fn resolve(&self, id: &RunnerId) -> Result<RunnerInstance, OrchestratorError> {
        let sel = selector::by_runner_id(id);

        let units = self
            .cluster
            .list_units(&sel)
            .await
            .map_err(OrchestratorError::Lookup)?;
        let credentials = self
            .cluster
            .list_credentials(&sel)
            .await
            .map_err(OrchestratorError::Lookup)?;

        if units.len() > 1 || credentials.len() > 1 {
            warn!(runner = %id, units = units.len(), credentials = credentials.len(), "runner id is shared by several objects");
        }

        Ok(RunnerInstance {
            id: id.clone(),
            unit: units.into_iter().next(),
            credential: credentials.into_iter().next(),
        })
    }

    /// Every runner that owns at least one object, ordered by id.
    ///
    /// The ids found on typed units and credentials are each passed through
    /// [`Registry::resolve`], so a runner is always reported with every object that
    /// carries its id. Any failed call fails the whole aggregation.
    pub async fn aggregate_all(&self) -> Result<Vec<RunnerInstance>, OrchestratorError> {
        let units = self
            .cluster
            .list_units(&selector::all_units())
            .await
            .map_err(OrchestratorError::Lookup)?;
        let credentials = self
            .cluster
            .list_credentials(&selector::all_credentials())
            .await
            .map_err(OrchestratorError::Lookup)?;

        let mut ids = BTreeSet::new();
        for unit in &units {
            match unit.runner_id() {
                Some(id) => {
                    ids.insert(id);
                }
                None => debug!(unit = %unit.name, "skipping unit without runner id"),
            }
        }
        for credential in &credentials {
            match credential.runner_id() {
                Some(id) => {
                    ids.insert(id);
                }
                None => debug!(credential = %credential.name, "skipping credential without runner id"),
            }
        }

        let mut runners = Vec::with_capacity(ids.len());
        for id in ids {
            runners.push(self.resolve(&id).await?);
        }
        Ok(runners)
    }
}

#[cfg(test)]
mod tests {
    use runbox_model::{
        ComputeUnit, Credential, LABEL_RUNNER_ID, Labels, Origin, UnitPhase,
        selector::{credential_labels, unit_labels},
    };

    use super::*;
    use crate::cluster::{FakeCluster, FakeOp};

    fn id(raw: &str) -> RunnerId {
        RunnerId::new(raw).unwrap()
    }

    fn unit(id: &RunnerId) -> ComputeUnit {
        ComputeUnit {
            name: id.unit_name(),
            labels: unit_labels(id, &Origin::new("10.0.0.5").unwrap()),
            phase: UnitPhase::Running,
            created_at: None,
            container: "runner".into(),
        }
    }

    fn credential(id: &RunnerId) -> Credential {
        Credential {
            name: id.credential_name(),
            labels: credential_labels(id),
        }
    }

    fn registry(fake: &FakeCluster) -> Registry {
        Registry::new(Arc::new(fake.clone()))
    }

    #[tokio::test]
    async fn resolve_reports_missing_objects_as_none() {
        let fake = FakeCluster::new();
        let a = id("aaaaaaaaaa");
        fake.insert_credential(credential(&a));

        let r = registry(&fake).resolve(&a).await.unwrap();
        assert_eq!(r.id, a);
        assert!(r.unit.is_none());
        assert_eq!(r.credential.unwrap().name, "runner-secrets-aaaaaaaaaa");

        let none = registry(&fake).resolve(&id("bbbbbbbbbb")).await.unwrap();
        assert!(none.is_gone());
    }

    #[tokio::test]
    async fn resolve_fails_when_any_listing_fails() {
        let fake = FakeCluster::new();
        fake.fail(FakeOp::ListCredentials);

        let err = registry(&fake).resolve(&id("aaaaaaaaaa")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Lookup(_)));
    }

    #[tokio::test]
    async fn aggregate_is_union_of_both_kinds() {
        let fake = FakeCluster::new();
        let (a, b, c) = (id("aaaaaaaaaa"), id("bbbbbbbbbb"), id("cccccccccc"));

        // A = {a, b}, B = {b, c}
        fake.insert_unit(unit(&a));
        fake.insert_unit(unit(&b));
        fake.insert_credential(credential(&b));
        fake.insert_credential(credential(&c));

        let all = registry(&fake).aggregate_all().await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["aaaaaaaaaa", "bbbbbbbbbb", "cccccccccc"]);

        assert!(all[0].unit.is_some() && all[0].credential.is_none());
        assert!(all[1].is_healthy());
        assert!(all[2].unit.is_none() && all[2].credential.is_some());
    }

    #[tokio::test]
    async fn aggregate_ignores_objects_without_runner_id() {
        let fake = FakeCluster::new();
        let mut stray = unit(&id("aaaaaaaaaa"));
        stray.labels = Labels::new().with("runbox.dev/type", "runner");
        fake.insert_unit(stray);

        let mut broken = credential(&id("bbbbbbbbbb"));
        broken.labels.insert(LABEL_RUNNER_ID, "NOT VALID");
        fake.insert_credential(broken);

        assert!(registry(&fake).aggregate_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn aggregate_pairs_objects_through_resolve() {
        let fake = FakeCluster::new();
        let a = id("ab12cd34ef");
        // The unit lost its type label but still carries the runner id.
        let mut untyped = unit(&a);
        untyped.labels = Labels::new().with(LABEL_RUNNER_ID, a.as_str());
        fake.insert_unit(untyped);
        fake.insert_credential(credential(&a));

        let all = registry(&fake).aggregate_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_healthy());
        assert_eq!(all[0], registry(&fake).resolve(&a).await.unwrap());
    }

    #[tokio::test]
    async fn aggregate_never_returns_partial_results() {
        let fake = FakeCluster::new();
        fake.insert_unit(unit(&id("aaaaaaaaaa")));
        fake.fail(FakeOp::ListCredentials);

        assert!(registry(&fake).aggregate_all().await.is_err());
    }
}
