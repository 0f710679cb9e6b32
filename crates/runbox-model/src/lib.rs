mod domain;
pub use domain::{
    CONTAINER_NAME, CREDENTIAL_KEY, CREDENTIAL_NAME_PREFIX, ENV_ACCESS_TOKEN, ENV_REPO_BRANCH,
    ENV_REPO_URL, LABEL_RUNNER_ID, LABEL_RUNNER_ORIGIN, LABEL_RUNNER_TYPE, RUNNER_TYPE_CREDS,
    RUNNER_TYPE_UNIT, UNIT_NAME_PREFIX,
};
pub use domain::{AccessToken, Env, EnvSource, EnvVar, Labels, Origin, RunnerId, TimeoutMs};

mod error;
pub use error::{ModelError, ModelResult};

mod resource;
pub use resource::{ComputeUnit, Credential, CredentialSpec, UnitPhase, UnitSpec, UnitTemplate};

mod runner;
pub use runner::RunnerInstance;

mod request;
pub use request::ProvisionRequest;

pub mod selector;
