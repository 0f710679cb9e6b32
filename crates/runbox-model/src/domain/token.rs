use std::fmt;

/// User-supplied access token placed into a runner's credential object.
///
/// Never printed: `Debug` and `Display` are redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Expose the secret value. Only the cluster backend should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::AccessToken;

    #[test]
    fn formatting_never_leaks_the_value() {
        let t = AccessToken::new("s3cr3t");
        assert!(!format!("{t:?}").contains("s3cr3t"));
        assert!(!t.to_string().contains("s3cr3t"));
        assert_eq!(t.expose(), "s3cr3t");
    }
}
