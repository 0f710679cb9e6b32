use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

const LABEL_VALUE_MAX: usize = 63;

/// Client-identifying string used for per-client admission control (usually the peer address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    /// Wrap a raw origin string. Surrounding whitespace is ignored.
    pub fn new(raw: impl Into<String>) -> ModelResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelError::EmptyOrigin);
        }
        Ok(Self(trimmed.to_string()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode the origin as a valid label value.
    ///
    /// Label values allow only `[A-Za-z0-9._-]`, must start and end alphanumeric and fit in 63 bytes.
    /// `:` becomes `_`, any other disallowed character becomes `-`, non-alphanumeric edges are trimmed.
    pub fn label_value(&self) -> String {
        let mapped: String = self
            .0
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
                ':' => '_',
                _ => '-',
            })
            .collect();

        let mut out: String = mapped
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .chars()
            .take(LABEL_VALUE_MAX)
            .collect();
        while out.ends_with(|c: char| !c.is_ascii_alphanumeric()) {
            out.pop();
        }
        out
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
