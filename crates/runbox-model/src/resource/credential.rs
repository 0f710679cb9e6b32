use crate::{AccessToken, LABEL_RUNNER_ID, Labels, RunnerId};

/// Everything needed to create one credential object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSpec {
    pub name: String,
    pub labels: Labels,
    /// Key under which `token` is stored.
    pub key: String,
    pub token: AccessToken,
}

/// Point-in-time snapshot of a credential object.
///
/// Carries metadata only: secret material is never read back from the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub name: String,
    pub labels: Labels,
}

impl Credential {
    /// Runner id from the [`LABEL_RUNNER_ID`] label, if present and well-formed.
    pub fn runner_id(&self) -> Option<RunnerId> {
        self.labels
            .get(LABEL_RUNNER_ID)
            .and_then(|raw| RunnerId::new(raw).ok())
    }
}
