use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Lifecycle phase of a compute unit as reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnitPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl UnitPhase {
    /// `true` for phases a unit never leaves (`Succeeded`, `Failed`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitPhase::Succeeded | UnitPhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitPhase::Pending => "Pending",
            UnitPhase::Running => "Running",
            UnitPhase::Succeeded => "Succeeded",
            UnitPhase::Failed => "Failed",
            UnitPhase::Unknown => "Unknown",
        }
    }
}

impl FromStr for UnitPhase {
    type Err = ModelError;
    fn from_str(s: &str) -> ModelResult<Self> {
        match s {
            "Pending" => Ok(UnitPhase::Pending),
            "Running" => Ok(UnitPhase::Running),
            "Succeeded" => Ok(UnitPhase::Succeeded),
            "Failed" => Ok(UnitPhase::Failed),
            "Unknown" => Ok(UnitPhase::Unknown),
            other => Err(ModelError::UnknownPhase(other.to_string())),
        }
    }
}

impl fmt::Display for UnitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::UnitPhase;

    #[test]
    fn only_failed_and_succeeded_are_terminal() {
        assert!(UnitPhase::Failed.is_terminal());
        assert!(UnitPhase::Succeeded.is_terminal());
        assert!(!UnitPhase::Pending.is_terminal());
        assert!(!UnitPhase::Running.is_terminal());
        assert!(!UnitPhase::Unknown.is_terminal());
    }

    #[test]
    fn parses_cluster_phase_strings() {
        for p in [
            UnitPhase::Pending,
            UnitPhase::Running,
            UnitPhase::Succeeded,
            UnitPhase::Failed,
            UnitPhase::Unknown,
        ] {
            assert_eq!(p.as_str().parse::<UnitPhase>().unwrap(), p);
        }
        assert!("running".parse::<UnitPhase>().is_err());
    }
}
