use thiserror::Error;

use runbox_model::{RunnerId, TimeoutMs, UnitPhase};

use crate::cluster::{ClusterError, ResourceKind};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to create {kind} '{name}': {source}")]
    Create {
        kind: ResourceKind,
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("runner {id} not ready after {timeout_ms}ms")]
    Timeout { id: RunnerId, timeout_ms: TimeoutMs },

    #[error("runner {id} reached terminal phase {phase} before becoming ready")]
    Terminated { id: RunnerId, phase: UnitPhase },

    #[error("attach to runner {id} failed: {source}")]
    Attach {
        id: RunnerId,
        #[source]
        source: ClusterError,
    },

    #[error("lookup failed: {0}")]
    Lookup(#[source] ClusterError),

    #[error("failed to destroy runner {id}: {}", join_failures(.failures))]
    Destroy {
        id: RunnerId,
        failures: Vec<ClusterError>,
    },
}

impl OrchestratorError {
    /// Short category name, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Config(_) => "config",
            OrchestratorError::Create { .. } => "create",
            OrchestratorError::Timeout { .. } => "timeout",
            OrchestratorError::Terminated { .. } => "terminated",
            OrchestratorError::Attach { .. } => "attach",
            OrchestratorError::Lookup(_) => "lookup",
            OrchestratorError::Destroy { .. } => "destroy",
        }
    }
}

fn join_failures(failures: &[ClusterError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
