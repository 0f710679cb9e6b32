use std::fmt;

use thiserror::Error;

/// Object kind a cluster call was about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Scope,
    Unit,
    Credential,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Scope => "scope",
            ResourceKind::Unit => "unit",
            ResourceKind::Credential => "credential",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("cluster api error: {0}")]
    Api(String),

    #[error("stream error: {0}")]
    Stream(String),
}

impl ClusterError {
    /// `true` when the object is already absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }

    /// `true` when the object name is already taken.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::AlreadyExists { .. })
    }
}
