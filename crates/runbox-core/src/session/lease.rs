use tokio::runtime::Handle;
use tracing::warn;

use runbox_model::RunnerInstance;

use crate::{
    destroy::{DestroyReason, Destroyer},
    error::OrchestratorError,
};

/// Provisioned runner that must be destroyed when its session ends.
///
/// Call [`RunnerLease::release`] on the normal path. A lease dropped without release
/// (early return, panic) schedules the destroy on the current runtime instead.
pub struct RunnerLease {
    runner: RunnerInstance,
    destroyer: Destroyer,
    armed: bool,
}

impl RunnerLease {
    pub fn new(runner: RunnerInstance, destroyer: Destroyer) -> Self {
        Self {
            runner,
            destroyer,
            armed: true,
        }
    }

    pub fn runner(&self) -> &RunnerInstance {
        &self.runner
    }

    /// Destroy the runner now.
    pub async fn release(mut self) -> Result<(), OrchestratorError> {
        self.armed = false;
        self.destroyer
            .destroy(&self.runner, DestroyReason::SessionEnd)
            .await
    }
}

impl Drop for RunnerLease {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let runner = self.runner.clone();
        let destroyer = self.destroyer.clone();

        match Handle::try_current() {
            Ok(handle) => {
                warn!(%runner, "lease dropped without release, destroying in background");
                handle.spawn(async move {
                    let _ = destroyer.destroy(&runner, DestroyReason::Abandoned).await;
                });
            }
            Err(_) => warn!(%runner, "lease dropped outside a runtime, leaving runner to the reconciler"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use runbox_model::{AccessToken, Origin, ProvisionRequest};

    use super::*;
    use crate::{
        cluster::{FakeCluster, FakeOp},
        destroy::DestroyPolicy,
        provision::{Provisioner, ProvisionerConfig},
    };

    async fn leased(fake: &FakeCluster) -> RunnerLease {
        let req = ProvisionRequest::new(
            "https://github.com/acme/tool.git",
            "main",
            Origin::new("10.0.0.5").unwrap(),
            AccessToken::new("t"),
        );
        let runner = Provisioner::new(Arc::new(fake.clone()), ProvisionerConfig::default())
            .provision(&req)
            .await
            .unwrap();
        RunnerLease::new(
            runner,
            Destroyer::new(Arc::new(fake.clone()), DestroyPolicy::Sequential),
        )
    }

    #[tokio::test]
    async fn release_destroys_once() {
        let fake = FakeCluster::new();
        let lease = leased(&fake).await;
        assert_eq!(fake.unit_names().len(), 1);

        lease.release().await.unwrap();
        tokio::task::yield_now().await;

        assert!(fake.unit_names().is_empty());
        assert!(fake.credential_names().is_empty());
        assert_eq!(fake.calls(FakeOp::DeleteUnit), 1);
    }

    #[tokio::test]
    async fn dropped_lease_destroys_in_background() {
        let fake = FakeCluster::new();
        drop(leased(&fake).await);

        for _ in 0..10 {
            if fake.unit_names().is_empty() && fake.credential_names().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(fake.unit_names().is_empty());
        assert!(fake.credential_names().is_empty());
    }
}
