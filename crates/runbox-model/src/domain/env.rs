use serde::{Deserialize, Serialize};

/// Where the value of an environment variable comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvSource {
    /// Literal value, visible in the unit's spec.
    Value(String),
    /// Indirect reference to a key of a credential object; the value never appears in the unit's spec.
    SecretKey { name: String, key: String },
}

/// Single environment variable of the primary container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    name: String,
    source: EnvSource,
}

impl EnvVar {
    /// Literal variable.
    pub fn value<K, V>(name: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            source: EnvSource::Value(value.into()),
        }
    }

    /// Variable resolved from `key` of the credential object `secret`.
    pub fn secret_key<K, S, V>(name: K, secret: S, key: V) -> Self
    where
        K: Into<String>,
        S: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            source: EnvSource::SecretKey {
                name: secret.into(),
                key: key.into(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &EnvSource {
        &self.source
    }
}

/// Ordered list of environment variables for the primary container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Env(pub Vec<EnvVar>);

impl Env {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnvVar> {
        self.0.iter()
    }

    /// Append a variable. Later entries win on lookup.
    pub fn push(&mut self, var: EnvVar) {
        self.0.push(var);
    }

    /// Source of the last variable named `name`.
    pub fn get(&self, name: &str) -> Option<&EnvSource> {
        self.0
            .iter()
            .rev()
            .find(|v| v.name() == name)
            .map(|v| v.source())
    }
}
