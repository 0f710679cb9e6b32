//! Interactive session flow: prompts, admission, provisioning, attach and guaranteed cleanup.
//!
//! The transport and the review metadata lookup are collaborators supplied by the caller
//! through [`SessionIo`] and [`ReviewSource`].
mod io;
pub use io::{LineSession, SessionError, SessionIo};

mod review;
pub use review::{ReviewError, ReviewRef, ReviewSource};

mod lease;
pub use lease::RunnerLease;

mod handler;
pub use handler::{SessionHandler, SessionMessages, SessionOutcome};
