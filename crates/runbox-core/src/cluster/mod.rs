//! Cluster API abstraction consumed by the orchestrator.
//!
//! Concrete backends (e.g. `runbox-kube`) implement [`Cluster`]; everything in this crate talks to it through `Arc<dyn Cluster>`.
mod error;
pub use error::{ClusterError, ResourceKind};

#[cfg(any(test, feature = "testing"))]
mod fake;
#[cfg(any(test, feature = "testing"))]
pub use fake::{FakeCluster, FakeOp, Rollout};

use std::{fmt, future::Future, pin::Pin};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use runbox_model::{ComputeUnit, Credential, CredentialSpec, Labels, UnitSpec};

/// Resolves when the remote side of an attach session is fully closed.
pub type SessionDone = Pin<Box<dyn Future<Output = Result<(), ClusterError>> + Send>>;

/// Open attach session to a unit's primary process.
pub struct RemoteSession {
    /// Bytes written here reach the process stdin.
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    /// Process output (stdout, and stderr when a TTY merges them).
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    /// Completion of the underlying protocol connection.
    pub done: SessionDone,
}

impl fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSession").finish_non_exhaustive()
    }
}

/// Client for the cluster orchestration API, scoped to a single namespace.
///
/// Implementations must be safe for unsynchronized concurrent use.
/// Selectors are equality-only: an object matches when it carries every selector label.
#[async_trait]
pub trait Cluster: Send + Sync + 'static {
    /// Get-or-create the resource scope (namespace) the runners live in.
    async fn ensure_scope(&self) -> Result<(), ClusterError>;

    /// List compute units matching `selector`.
    async fn list_units(&self, selector: &Labels) -> Result<Vec<ComputeUnit>, ClusterError>;

    /// List credential objects matching `selector`.
    async fn list_credentials(&self, selector: &Labels) -> Result<Vec<Credential>, ClusterError>;

    /// Read the current state of one compute unit.
    async fn get_unit(&self, name: &str) -> Result<ComputeUnit, ClusterError>;

    /// Create an immutable credential object.
    async fn create_credential(&self, spec: &CredentialSpec) -> Result<Credential, ClusterError>;

    /// Create a compute unit.
    async fn create_unit(&self, spec: &UnitSpec) -> Result<ComputeUnit, ClusterError>;

    /// Delete a compute unit immediately (no grace period).
    async fn delete_unit(&self, name: &str) -> Result<(), ClusterError>;

    /// Delete a credential object.
    async fn delete_credential(&self, name: &str) -> Result<(), ClusterError>;

    /// Attach to the primary container of `unit` with stdin and a TTY.
    async fn attach(&self, unit: &ComputeUnit) -> Result<RemoteSession, ClusterError>;
}
