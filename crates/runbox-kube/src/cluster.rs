use async_trait::async_trait;
use k8s_openapi::{
    api::core::v1::{Namespace, Pod, Secret},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{
    Api, Client,
    api::{AttachParams, DeleteParams, ListParams, PostParams},
};
use tracing::{debug, info};

use runbox_core::{Cluster, ClusterError, RemoteSession, ResourceKind};
use runbox_model::{ComputeUnit, Credential, CredentialSpec, Labels, UnitSpec};

use crate::{
    connect::{ConnectMode, connect},
    convert::{credential_from_secret, unit_from_pod},
    error::{KubeError, cluster_error},
    manifest::{credential_manifest, unit_manifest},
};

/// [`Cluster`] over pods and secrets of one namespace.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    namespace: String,
    pods: Api<Pod>,
    secrets: Api<Secret>,
}

impl KubeCluster {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            pods: Api::namespaced(client.clone(), &namespace),
            secrets: Api::namespaced(client.clone(), &namespace),
            client,
            namespace,
        }
    }

    /// Connect with `mode` and scope to `namespace`.
    pub async fn connect(mode: &ConnectMode, namespace: impl Into<String>) -> Result<Self, KubeError> {
        let client = connect(mode).await?;
        Ok(Self::new(client, namespace))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn ensure_scope(&self) -> Result<(), ClusterError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let existing = namespaces
            .get_opt(&self.namespace)
            .await
            .map_err(|e| cluster_error(ResourceKind::Scope, &self.namespace, e))?;
        if existing.is_some() {
            debug!(namespace = %self.namespace, "namespace exists");
            return Ok(());
        }

        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(self.namespace.clone()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };

        match namespaces.create(&PostParams::default(), &ns).await {
            Ok(_) => {
                info!(namespace = %self.namespace, "namespace created");
                Ok(())
            }
            Err(e) => match cluster_error(ResourceKind::Scope, &self.namespace, e) {
                // Created concurrently by someone else.
                ClusterError::AlreadyExists { .. } => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn list_units(&self, selector: &Labels) -> Result<Vec<ComputeUnit>, ClusterError> {
        let params = ListParams::default().labels(&selector.to_selector());
        let pods = self
            .pods
            .list(&params)
            .await
            .map_err(|e| ClusterError::Api(e.to_string()))?;
        Ok(pods.items.into_iter().map(unit_from_pod).collect())
    }

    async fn list_credentials(&self, selector: &Labels) -> Result<Vec<Credential>, ClusterError> {
        let params = ListParams::default().labels(&selector.to_selector());
        let secrets = self
            .secrets
            .list(&params)
            .await
            .map_err(|e| ClusterError::Api(e.to_string()))?;
        Ok(secrets.items.into_iter().map(credential_from_secret).collect())
    }

    async fn get_unit(&self, name: &str) -> Result<ComputeUnit, ClusterError> {
        let pod = self
            .pods
            .get(name)
            .await
            .map_err(|e| cluster_error(ResourceKind::Unit, name, e))?;
        Ok(unit_from_pod(pod))
    }

    async fn create_credential(&self, spec: &CredentialSpec) -> Result<Credential, ClusterError> {
        let secret = credential_manifest(spec);
        let created = self
            .secrets
            .create(&PostParams::default(), &secret)
            .await
            .map_err(|e| cluster_error(ResourceKind::Credential, &spec.name, e))?;
        Ok(credential_from_secret(created))
    }

    async fn create_unit(&self, spec: &UnitSpec) -> Result<ComputeUnit, ClusterError> {
        let pod = unit_manifest(spec);
        let created = self
            .pods
            .create(&PostParams::default(), &pod)
            .await
            .map_err(|e| cluster_error(ResourceKind::Unit, &spec.name, e))?;
        Ok(unit_from_pod(created))
    }

    async fn delete_unit(&self, name: &str) -> Result<(), ClusterError> {
        let params = DeleteParams {
            grace_period_seconds: Some(0),
            ..DeleteParams::default()
        };
        self.pods
            .delete(name, &params)
            .await
            .map(|_| ())
            .map_err(|e| cluster_error(ResourceKind::Unit, name, e))
    }

    async fn delete_credential(&self, name: &str) -> Result<(), ClusterError> {
        self.secrets
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| cluster_error(ResourceKind::Credential, name, e))
    }

    async fn attach(&self, unit: &ComputeUnit) -> Result<RemoteSession, ClusterError> {
        // With a TTY the runtime merges stderr into stdout; both cannot be requested.
        let params = AttachParams::interactive_tty().container(unit.container.clone());
        let mut process = self
            .pods
            .attach(&unit.name, &params)
            .await
            .map_err(|e| cluster_error(ResourceKind::Unit, &unit.name, e))?;

        let stdin = process
            .stdin()
            .ok_or_else(|| ClusterError::Stream("attach returned no stdin".into()))?;
        let stdout = process
            .stdout()
            .ok_or_else(|| ClusterError::Stream("attach returned no stdout".into()))?;

        Ok(RemoteSession {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            done: Box::pin(async move {
                process
                    .join()
                    .await
                    .map_err(|e| ClusterError::Stream(e.to_string()))
            }),
        })
    }
}
