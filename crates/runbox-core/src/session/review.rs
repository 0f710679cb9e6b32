use async_trait::async_trait;
use thiserror::Error;

/// Checkout target resolved from a code-review request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRef {
    pub clone_url: String,
    pub branch: String,
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("review request #{0} not found")]
    NotFound(u64),

    #[error("review service unavailable: {0}")]
    Unavailable(String),

    #[error("malformed review metadata: {0}")]
    Invalid(String),
}

/// Maps a review request number to the branch it proposes.
#[async_trait]
pub trait ReviewSource: Send + Sync + 'static {
    async fn lookup(&self, number: u64) -> Result<ReviewRef, ReviewError>;
}
