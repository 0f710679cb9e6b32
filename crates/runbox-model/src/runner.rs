use std::fmt;

use crate::{ComputeUnit, Credential, RunnerId};

/// Snapshot of one logical runner: its id plus whichever of its two objects currently exist.
///
/// This is not an owned handle; re-resolving the same id may return a different snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerInstance {
    pub id: RunnerId,
    pub unit: Option<ComputeUnit>,
    pub credential: Option<Credential>,
}

impl RunnerInstance {
    /// Snapshot with neither object present.
    pub fn empty(id: RunnerId) -> Self {
        Self {
            id,
            unit: None,
            credential: None,
        }
    }

    /// Both objects exist.
    pub fn is_healthy(&self) -> bool {
        self.unit.is_some() && self.credential.is_some()
    }

    /// Exactly one object exists (half provisioned or half destroyed).
    pub fn is_orphan(&self) -> bool {
        self.unit.is_some() != self.credential.is_some()
    }

    /// No object exists.
    pub fn is_gone(&self) -> bool {
        self.unit.is_none() && self.credential.is_none()
    }
}

impl fmt::Display for RunnerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Runner(id={}, unit={}, credential={})",
            self.id,
            self.unit.as_ref().map_or("-", |u| u.name.as_str()),
            self.credential.as_ref().map_or("-", |c| c.name.as_str()),
        )
    }
}
