use crate::{AccessToken, Origin};

/// Input of a single provisioning call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    /// Repository clone URL the sandbox checks out.
    pub clone_url: String,
    /// Branch the sandbox checks out.
    pub branch: String,
    /// Client origin, recorded on the compute unit for admission control.
    pub origin: Origin,
    /// Token stored in the runner's credential object.
    pub token: AccessToken,
}

impl ProvisionRequest {
    pub fn new(
        clone_url: impl Into<String>,
        branch: impl Into<String>,
        origin: Origin,
        token: AccessToken,
    ) -> Self {
        Self {
            clone_url: clone_url.into(),
            branch: branch.into(),
            origin,
            token,
        }
    }
}
