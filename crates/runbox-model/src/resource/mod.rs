//! Backend-neutral views of the two cluster object kinds a runner is made of.
mod phase;
pub use phase::UnitPhase;

mod unit;
pub use unit::{ComputeUnit, UnitSpec, UnitTemplate};

mod credential;
pub use credential::{Credential, CredentialSpec};
