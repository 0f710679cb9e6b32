mod env;
pub use env::{Env, EnvSource, EnvVar};

mod labels;
pub use labels::Labels;

mod id;
pub use id::RunnerId;

mod origin;
pub use origin::Origin;

mod token;
pub use token::AccessToken;

mod constants;
pub use constants::{
    CONTAINER_NAME, CREDENTIAL_KEY, CREDENTIAL_NAME_PREFIX, ENV_ACCESS_TOKEN, ENV_REPO_BRANCH,
    ENV_REPO_URL, LABEL_RUNNER_ID, LABEL_RUNNER_ORIGIN, LABEL_RUNNER_TYPE, RUNNER_TYPE_CREDS,
    RUNNER_TYPE_UNIT, UNIT_NAME_PREFIX,
};

/// Duration value in milliseconds.
///
/// Used in configs where a plain integer is friendlier than a serialized `Duration`.
pub type TimeoutMs = u64;
