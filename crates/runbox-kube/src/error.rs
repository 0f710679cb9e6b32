use thiserror::Error;

use runbox_core::{ClusterError, ResourceKind};

#[derive(Debug, Error)]
pub enum KubeError {
    #[error("cluster config error: {0}")]
    Config(String),

    #[error("kube client error: {0}")]
    Client(#[from] kube::Error),
}

/// Translate a kube error about `kind`/`name` into the backend-neutral form.
pub(crate) fn cluster_error(kind: ResourceKind, name: &str, err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => ClusterError::NotFound {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(resp) if resp.code == 409 => ClusterError::AlreadyExists {
            kind,
            name: name.to_string(),
        },
        other => ClusterError::Api(other.to_string()),
    }
}
