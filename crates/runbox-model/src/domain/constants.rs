//! Well-known keys and names shared by every layer that touches cluster objects.
//!
//! Runner objects are correlated only through these labels, so there must be exactly one definition of each key.

/// Label carrying the runner id. Present on both the compute unit and the credential object.
pub const LABEL_RUNNER_ID: &str = "runbox.dev/runner-id";

/// Label carrying the object role, see [`RUNNER_TYPE_UNIT`] and [`RUNNER_TYPE_CREDS`].
pub const LABEL_RUNNER_TYPE: &str = "runbox.dev/type";

/// Label carrying the label-safe origin of the client. Compute units only.
pub const LABEL_RUNNER_ORIGIN: &str = "runbox.dev/origin";

/// [`LABEL_RUNNER_TYPE`] value for compute units.
pub const RUNNER_TYPE_UNIT: &str = "runner";

/// [`LABEL_RUNNER_TYPE`] value for credential objects.
pub const RUNNER_TYPE_CREDS: &str = "runner-creds";

/// Object name prefix for compute units (`runner-<id>`).
pub const UNIT_NAME_PREFIX: &str = "runner-";

/// Object name prefix for credential objects (`runner-secrets-<id>`).
pub const CREDENTIAL_NAME_PREFIX: &str = "runner-secrets-";

/// Name of the single container inside a compute unit.
pub const CONTAINER_NAME: &str = "runner";

/// Key under which the access token is stored in the credential object.
pub const CREDENTIAL_KEY: &str = "access-token";

/// Environment variable with the repository clone URL.
pub const ENV_REPO_URL: &str = "GIT_REPO_URL";

/// Environment variable with the branch to check out.
pub const ENV_REPO_BRANCH: &str = "GIT_REPO_BRANCH";

/// Environment variable that receives the access token via a secret reference.
pub const ENV_ACCESS_TOKEN: &str = "ACCESS_TOKEN";
