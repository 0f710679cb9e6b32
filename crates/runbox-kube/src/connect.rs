use std::path::PathBuf;

use kube::{
    Client, Config,
    config::{KubeConfigOptions, Kubeconfig},
};
use tracing::info;

use crate::error::KubeError;

/// Where cluster credentials come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectMode {
    /// Service account mounted into the daemon's own pod.
    InCluster,
    /// Explicit kubeconfig file.
    Kubeconfig(PathBuf),
    /// `KUBECONFIG`, `~/.kube/config`, then in-cluster.
    Infer,
}

/// Build a client for `mode`. Every failure is a [`KubeError::Config`].
pub async fn connect(mode: &ConnectMode) -> Result<Client, KubeError> {
    let config = match mode {
        ConnectMode::InCluster => {
            Config::incluster().map_err(|e| KubeError::Config(format!("in-cluster config: {e}")))?
        }
        ConnectMode::Kubeconfig(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| KubeError::Config(format!("read {}: {e}", path.display())))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| KubeError::Config(format!("load {}: {e}", path.display())))?
        }
        ConnectMode::Infer => Config::infer()
            .await
            .map_err(|e| KubeError::Config(format!("infer config: {e}")))?,
    };

    info!(cluster = %config.cluster_url, mode = ?mode, "cluster config loaded");
    Client::try_from(config).map_err(|e| KubeError::Config(format!("build client: {e}")))
}
