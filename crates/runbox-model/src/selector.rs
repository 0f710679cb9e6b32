//! Label sets and selectors of the runner tagging scheme.
//!
//! Both the labels written on create and the selectors used on list are built here,
//! so the two sides cannot drift apart.
use crate::{
    LABEL_RUNNER_ID, LABEL_RUNNER_ORIGIN, LABEL_RUNNER_TYPE, Labels, Origin, RUNNER_TYPE_CREDS,
    RUNNER_TYPE_UNIT, RunnerId,
};

/// Labels written on a runner's compute unit.
pub fn unit_labels(id: &RunnerId, origin: &Origin) -> Labels {
    Labels::new()
        .with(LABEL_RUNNER_ID, id.as_str())
        .with(LABEL_RUNNER_TYPE, RUNNER_TYPE_UNIT)
        .with(LABEL_RUNNER_ORIGIN, origin.label_value())
}

/// Labels written on a runner's credential object.
pub fn credential_labels(id: &RunnerId) -> Labels {
    Labels::new()
        .with(LABEL_RUNNER_ID, id.as_str())
        .with(LABEL_RUNNER_TYPE, RUNNER_TYPE_CREDS)
}

/// Objects of either kind belonging to `id`.
pub fn by_runner_id(id: &RunnerId) -> Labels {
    Labels::new().with(LABEL_RUNNER_ID, id.as_str())
}

/// Every runner compute unit.
pub fn all_units() -> Labels {
    Labels::new().with(LABEL_RUNNER_TYPE, RUNNER_TYPE_UNIT)
}

/// Every runner credential object.
pub fn all_credentials() -> Labels {
    Labels::new().with(LABEL_RUNNER_TYPE, RUNNER_TYPE_CREDS)
}

/// Runner compute units created for `origin`.
pub fn units_by_origin(origin: &Origin) -> Labels {
    all_units().with(LABEL_RUNNER_ORIGIN, origin.label_value())
}
