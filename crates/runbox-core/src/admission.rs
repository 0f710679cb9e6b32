use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use runbox_model::{Origin, selector};

use crate::{cluster::Cluster, error::OrchestratorError};

/// Admission settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdmissionConfig {
    /// Live runners allowed per origin.
    pub max_concurrent: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { max_concurrent: 3 }
    }
}

/// Per-origin cap on live runners, counted from the cluster on every check.
///
/// Read-then-decide: concurrent checks for one origin may all pass and overshoot the cap.
#[derive(Clone)]
pub struct AdmissionController {
    cluster: Arc<dyn Cluster>,
    config: AdmissionConfig,
}

impl AdmissionController {
    pub fn new(cluster: Arc<dyn Cluster>, config: AdmissionConfig) -> Self {
        Self { cluster, config }
    }

    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent
    }

    /// Number of units currently labelled with `origin`.
    pub async fn count(&self, origin: &Origin) -> Result<usize, OrchestratorError> {
        let units = self
            .cluster
            .list_units(&selector::units_by_origin(origin))
            .await
            .map_err(OrchestratorError::Lookup)?;
        Ok(units.len())
    }

    /// `true` when `origin` has fewer live units than the cap.
    pub async fn can_provision(&self, origin: &Origin) -> Result<bool, OrchestratorError> {
        let count = self.count(origin).await?;
        let allowed = count < self.config.max_concurrent;
        debug!(%origin, count, max = self.config.max_concurrent, allowed, "admission check");
        Ok(allowed)
    }
}
