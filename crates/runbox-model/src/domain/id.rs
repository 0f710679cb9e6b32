use std::{fmt, str::FromStr};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    CREDENTIAL_NAME_PREFIX, UNIT_NAME_PREFIX,
    error::{ModelError, ModelResult},
};

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of generated ids. 36^16 values keeps collisions negligible at any realistic churn.
const GENERATED_LEN: usize = 16;

const MIN_LEN: usize = 10;
const MAX_LEN: usize = 63;

/// Correlation token shared by every cluster object of one runner.
///
/// Restricted to lowercase alphanumerics so it is valid both as a label value and as part of an object name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunnerId(String);

impl RunnerId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let id = (0..GENERATED_LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Validate and wrap an existing id (e.g. read back from a label).
    pub fn new(raw: impl Into<String>) -> ModelResult<Self> {
        let raw = raw.into();
        let valid_len = (MIN_LEN..=MAX_LEN).contains(&raw.len());
        let valid_chars = raw.bytes().all(|b| ALPHABET.contains(&b));
        if valid_len && valid_chars {
            Ok(Self(raw))
        } else {
            Err(ModelError::InvalidRunnerId(raw))
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the compute unit owned by this runner.
    pub fn unit_name(&self) -> String {
        format!("{UNIT_NAME_PREFIX}{}", self.0)
    }

    /// Name of the credential object owned by this runner.
    pub fn credential_name(&self) -> String {
        format!("{CREDENTIAL_NAME_PREFIX}{}", self.0)
    }
}

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RunnerId {
    type Err = ModelError;
    fn from_str(s: &str) -> ModelResult<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for RunnerId {
    type Error = ModelError;
    fn try_from(s: String) -> ModelResult<Self> {
        Self::new(s)
    }
}

impl From<RunnerId> for String {
    fn from(id: RunnerId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::RunnerId;

    #[test]
    fn generated_ids_are_valid() {
        for _ in 0..100 {
            let id = RunnerId::generate();
            assert_eq!(id.as_str().len(), 16);
            assert!(RunnerId::new(id.as_str()).is_ok(), "invalid id: {id}");
        }
    }

    #[test]
    fn generated_ids_do_not_repeat() {
        let ids: HashSet<_> = (0..1000).map(|_| RunnerId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn accepts_ten_char_ids() {
        let id: RunnerId = "ab12cd34ef".parse().unwrap();
        assert_eq!(id.as_str(), "ab12cd34ef");
    }

    #[test]
    fn rejects_bad_ids() {
        for bad in ["", "short", "ABCDEFGHIJKL", "abc_def_ghij", &"a".repeat(64)] {
            assert!(RunnerId::new(bad).is_err(), "expected {bad:?} to be rejected");
        }
    }

    #[test]
    fn object_names_embed_the_id() {
        let id = RunnerId::new("ab12cd34ef").unwrap();
        assert_eq!(id.unit_name(), "runner-ab12cd34ef");
        assert_eq!(id.credential_name(), "runner-secrets-ab12cd34ef");
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: RunnerId = serde_json::from_str(r#""ab12cd34ef""#).unwrap();
        assert_eq!(ok.as_str(), "ab12cd34ef");
        assert!(serde_json::from_str::<RunnerId>(r#""NOPE""#).is_err());
    }
}
