//! Pod and secret objects read back into backend-neutral snapshots.
use k8s_openapi::api::core::v1::{Pod, Secret};
use time::OffsetDateTime;
use tracing::debug;

use runbox_model::{CONTAINER_NAME, ComputeUnit, Credential, Labels, UnitPhase};

pub fn unit_from_pod(pod: Pod) -> ComputeUnit {
    let meta = pod.metadata;
    let name = meta.name.unwrap_or_default();

    let phase = match pod.status.and_then(|s| s.phase) {
        None => UnitPhase::Pending,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            debug!(pod = %name, phase = %raw, "unrecognized pod phase");
            UnitPhase::Unknown
        }),
    };

    let created_at = meta
        .creation_timestamp
        .and_then(|t| OffsetDateTime::from_unix_timestamp(t.0.timestamp()).ok());

    let container = pod
        .spec
        .and_then(|s| s.containers.into_iter().next())
        .map(|c| c.name)
        .unwrap_or_else(|| CONTAINER_NAME.to_string());

    ComputeUnit {
        name,
        labels: Labels::from(meta.labels.unwrap_or_default()),
        phase,
        created_at,
        container,
    }
}

/// Metadata only; `data` is never copied out.
pub fn credential_from_secret(secret: Secret) -> Credential {
    let meta = secret.metadata;
    Credential {
        name: meta.name.unwrap_or_default(),
        labels: Labels::from(meta.labels.unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn pod(value: serde_json::Value) -> Pod {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn running_pod_becomes_unit() {
        let unit = unit_from_pod(pod(json!({
            "metadata": {
                "name": "runner-ab12cd34ef",
                "labels": { "runbox.dev/runner-id": "ab12cd34ef" },
                "creationTimestamp": "2024-01-02T03:04:05Z",
            },
            "spec": { "containers": [{ "name": "runner", "image": "img" }] },
            "status": { "phase": "Running" },
        })));

        assert_eq!(unit.name, "runner-ab12cd34ef");
        assert_eq!(unit.phase, UnitPhase::Running);
        assert_eq!(unit.container, "runner");
        assert_eq!(unit.runner_id().unwrap().as_str(), "ab12cd34ef");
        assert_eq!(
            unit.created_at,
            Some(OffsetDateTime::from_unix_timestamp(1_704_164_645).unwrap())
        );
    }

    #[test]
    fn missing_status_is_pending_and_odd_phase_is_unknown() {
        let fresh = unit_from_pod(pod(json!({ "metadata": { "name": "runner-a" } })));
        assert_eq!(fresh.phase, UnitPhase::Pending);
        assert_eq!(fresh.container, CONTAINER_NAME);
        assert!(fresh.created_at.is_none());

        let odd = unit_from_pod(pod(json!({
            "metadata": { "name": "runner-b" },
            "status": { "phase": "Evicted" },
        })));
        assert_eq!(odd.phase, UnitPhase::Unknown);
    }

    #[test]
    fn secret_keeps_metadata_only() {
        let secret: Secret = serde_json::from_value(json!({
            "metadata": {
                "name": "runner-secrets-ab12cd34ef",
                "labels": { "runbox.dev/runner-id": "ab12cd34ef" },
            },
            "data": { "access-token": "dG9rZW4=" },
        }))
        .unwrap();

        let credential = credential_from_secret(secret);
        assert_eq!(credential.name, "runner-secrets-ab12cd34ef");
        assert_eq!(credential.runner_id().unwrap().as_str(), "ab12cd34ef");
    }
}
