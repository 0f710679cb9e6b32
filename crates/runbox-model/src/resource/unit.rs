use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{Env, LABEL_RUNNER_ID, Labels, RunnerId, UnitPhase};

/// Operator-controlled part of every compute unit: image and resource limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UnitTemplate {
    /// Sandbox image (e.g. `"ghcr.io/acme/cli-runner:latest"`).
    pub image: String,
    /// CPU limit in cluster quantity notation (e.g. `"500m"`). `None` leaves it unset.
    pub cpu_limit: Option<String>,
    /// Memory limit in cluster quantity notation (e.g. `"512Mi"`). `None` leaves it unset.
    pub memory_limit: Option<String>,
}

impl Default for UnitTemplate {
    fn default() -> Self {
        Self {
            image: "runbox-runner:latest".to_string(),
            cpu_limit: Some("500m".to_string()),
            memory_limit: Some("512Mi".to_string()),
        }
    }
}

/// Everything needed to create one compute unit.
///
/// The unit always runs a single container with stdin and a TTY, restart policy `Never`
/// and no ambient service identity; those are fixed by the backend, not configurable here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSpec {
    pub name: String,
    pub labels: Labels,
    pub container: String,
    pub template: UnitTemplate,
    pub env: Env,
}

/// Point-in-time snapshot of a compute unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeUnit {
    pub name: String,
    pub labels: Labels,
    pub phase: UnitPhase,
    /// Creation time reported by the cluster; `None` if the cluster did not report one.
    pub created_at: Option<OffsetDateTime>,
    /// Name of the primary container (the attach target).
    pub container: String,
}

impl ComputeUnit {
    /// Runner id from the [`LABEL_RUNNER_ID`] label, if present and well-formed.
    pub fn runner_id(&self) -> Option<RunnerId> {
        self.labels
            .get(LABEL_RUNNER_ID)
            .and_then(|raw| RunnerId::new(raw).ok())
    }

    /// Age relative to `now`. `None` without a creation time.
    pub fn age(&self, now: OffsetDateTime) -> Option<Duration> {
        self.created_at.map(|created| now - created)
    }
}
