//! Runner orchestration over a cluster API.
//!
//! A runner is a compute unit plus a credential object, correlated by a shared id label.
//! This crate drives their lifecycle ([`Provisioner`], [`Attacher`], [`Destroyer`]),
//! looks them up ([`Registry`]), caps them per client ([`AdmissionController`])
//! and keeps the cluster clean in the background ([`Reconciler`]).
//!
//! The cluster itself is abstracted by [`Cluster`]; the orchestrator keeps no local state.
pub mod cluster;
pub use cluster::{Cluster, ClusterError, RemoteSession, ResourceKind};

mod error;
pub use error::OrchestratorError;

pub mod metrics;
pub use metrics::{MetricsBackend, MetricsHandle, NoOpMetrics, ProvisionOutcome, noop_metrics};

mod registry;
pub use registry::Registry;

mod provision;
pub use provision::{ProvisionerConfig, Provisioner};

mod attach;
pub use attach::{Attacher, bridge};

mod destroy;
pub use destroy::{DestroyPolicy, DestroyReason, Destroyer};

mod reconcile;
pub use reconcile::{
    Reconciler, ReconcilerConfig, ReconcilerHandle, SweepKind, SweepReport, should_remove,
};

mod admission;
pub use admission::{AdmissionConfig, AdmissionController};

mod orchestrator;
pub use orchestrator::{Orchestrator, OrchestratorConfig};

pub mod session;

pub mod prelude {
    pub use crate::cluster::{Cluster, ClusterError};
    pub use crate::error::OrchestratorError;
    pub use crate::orchestrator::{Orchestrator, OrchestratorConfig};
    pub use crate::session::{ReviewSource, SessionHandler, SessionIo};
}
