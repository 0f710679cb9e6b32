//! Kubernetes backend for [`runbox_core::Cluster`].
//!
//! Compute units are pods, credentials are secrets, both living in one namespace.
//! Attach uses the pod `attach` subresource over websockets.
mod error;
pub use error::KubeError;

mod connect;
pub use connect::{ConnectMode, connect};

mod manifest;
pub use manifest::{credential_manifest, unit_manifest};

mod convert;
pub use convert::{credential_from_secret, unit_from_pod};

mod cluster;
pub use cluster::KubeCluster;
