//! Pod and secret manifests for a runner.
use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{
        Container, EnvVar, EnvVarSource, Pod, PodSpec, ResourceRequirements, Secret, SecretKeySelector,
    },
    apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::ObjectMeta},
};

use runbox_model::{CredentialSpec, EnvSource, Labels, UnitSpec};

fn metadata(name: &str, labels: &Labels) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(labels.clone().into_inner()),
        ..ObjectMeta::default()
    }
}

/// Immutable secret holding the token under `spec.key`.
pub fn credential_manifest(spec: &CredentialSpec) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(spec.key.clone(), spec.token.expose().to_string());

    Secret {
        metadata: metadata(&spec.name, &spec.labels),
        type_: Some("Opaque".into()),
        immutable: Some(true),
        string_data: Some(data),
        ..Secret::default()
    }
}

fn env_var(var: &runbox_model::EnvVar) -> EnvVar {
    match var.source() {
        EnvSource::Value(value) => EnvVar {
            name: var.name().to_string(),
            value: Some(value.to_string()),
            value_from: None,
        },
        EnvSource::SecretKey { name, key } => EnvVar {
            name: var.name().to_string(),
            value: None,
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: name.to_string(),
                    key: key.to_string(),
                    optional: None,
                }),
                ..EnvVarSource::default()
            }),
        },
    }
}

/// Single-container pod with stdin and a TTY, no service account token and no restarts.
pub fn unit_manifest(spec: &UnitSpec) -> Pod {
    let mut limits = BTreeMap::new();
    if let Some(cpu) = &spec.template.cpu_limit {
        limits.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &spec.template.memory_limit {
        limits.insert("memory".to_string(), Quantity(memory.clone()));
    }
    let resources = (!limits.is_empty()).then(|| ResourceRequirements {
        limits: Some(limits),
        ..ResourceRequirements::default()
    });

    let container = Container {
        name: spec.container.clone(),
        image: Some(spec.template.image.clone()),
        stdin: Some(true),
        tty: Some(true),
        env: Some(spec.env.iter().map(env_var).collect()),
        resources,
        ..Container::default()
    };

    Pod {
        metadata: metadata(&spec.name, &spec.labels),
        spec: Some(PodSpec {
            automount_service_account_token: Some(false),
            restart_policy: Some("Never".into()),
            containers: vec![container],
            ..PodSpec::default()
        }),
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use runbox_model::{AccessToken, Env, EnvVar, UnitTemplate};

    use super::*;

    fn unit_spec(template: UnitTemplate) -> UnitSpec {
        let mut env = Env::new();
        env.push(EnvVar::value("GIT_REPO_URL", "https://github.com/acme/tool.git"));
        env.push(EnvVar::secret_key("ACCESS_TOKEN", "runner-secrets-ab12cd34ef", "access-token"));
        UnitSpec {
            name: "runner-ab12cd34ef".into(),
            labels: Labels::new().with("runbox.dev/runner-id", "ab12cd34ef"),
            container: "runner".into(),
            template,
            env,
        }
    }

    #[test]
    fn pod_is_interactive_and_locked_down() {
        let pod = unit_manifest(&unit_spec(UnitTemplate::default()));
        let v = serde_json::to_value(&pod).unwrap();

        assert_eq!(v["metadata"]["name"], "runner-ab12cd34ef");
        assert_eq!(v["metadata"]["labels"]["runbox.dev/runner-id"], "ab12cd34ef");
        assert_eq!(v["spec"]["automountServiceAccountToken"], false);
        assert_eq!(v["spec"]["restartPolicy"], "Never");

        let c = &v["spec"]["containers"][0];
        assert_eq!(c["name"], "runner");
        assert_eq!(c["image"], "runbox-runner:latest");
        assert_eq!(c["stdin"], true);
        assert_eq!(c["tty"], true);
        assert_eq!(c["resources"]["limits"]["cpu"], "500m");
        assert_eq!(c["resources"]["limits"]["memory"], "512Mi");
    }

    #[test]
    fn token_is_referenced_not_inlined() {
        let pod = unit_manifest(&unit_spec(UnitTemplate::default()));
        let v = serde_json::to_value(&pod).unwrap();
        let env = &v["spec"]["containers"][0]["env"];

        assert_eq!(env[0]["value"], "https://github.com/acme/tool.git");
        assert_eq!(env[1]["name"], "ACCESS_TOKEN");
        assert!(env[1].get("value").is_none());
        assert_eq!(env[1]["valueFrom"]["secretKeyRef"]["name"], "runner-secrets-ab12cd34ef");
        assert_eq!(env[1]["valueFrom"]["secretKeyRef"]["key"], "access-token");
    }

    #[test]
    fn secret_reference_is_typed() {
        let pod = unit_manifest(&unit_spec(UnitTemplate::default()));
        let spec = pod.spec.unwrap();
        let env = spec.containers[0].env.clone().unwrap();
        let selector = env[1].value_from.as_ref().and_then(|s| s.secret_key_ref.as_ref()).unwrap();

        assert_eq!(selector.name, "runner-secrets-ab12cd34ef");
        assert_eq!(selector.key, "access-token");
        assert_eq!(spec.containers[0].resources.as_ref().unwrap().limits.as_ref().unwrap()["cpu"].0, "500m");
    }

    #[test]
    fn unset_limits_are_omitted() {
        let template = UnitTemplate {
            cpu_limit: None,
            memory_limit: None,
            ..UnitTemplate::default()
        };
        let pod = unit_manifest(&unit_spec(template));
        let v = serde_json::to_value(&pod).unwrap();
        assert!(v["spec"]["containers"][0].get("resources").is_none());
    }

    #[test]
    fn secret_is_immutable_and_keyed() {
        let secret = credential_manifest(&CredentialSpec {
            name: "runner-secrets-ab12cd34ef".into(),
            labels: Labels::new().with("runbox.dev/type", "runner-creds"),
            key: "access-token".into(),
            token: AccessToken::new("tok-123"),
        });

        assert_eq!(secret.immutable, Some(true));
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
        assert_eq!(
            secret.string_data.unwrap().get("access-token").map(String::as_str),
            Some("tok-123")
        );
        assert_eq!(
            secret.metadata.labels.unwrap().get("runbox.dev/type").map(String::as_str),
            Some("runner-creds")
        );
    }
}
