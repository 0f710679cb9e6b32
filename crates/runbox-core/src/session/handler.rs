use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use runbox_model::{AccessToken, Origin, ProvisionRequest};

use crate::{
    orchestrator::Orchestrator,
    session::{ReviewSource, SessionError, SessionIo},
};

/// Texts shown to the client. `{max}` in `rate_limited` is replaced by the cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionMessages {
    pub review_prompt: String,
    pub token_prompt: String,
    pub invalid_review: String,
    pub review_failed: String,
    pub empty_token: String,
    pub rate_limited: String,
    pub unavailable: String,
    pub provisioning: String,
    pub provision_failed: String,
    pub attaching: String,
    pub attach_failed: String,
}

impl Default for SessionMessages {
    fn default() -> Self {
        Self {
            review_prompt: "Review request #:".into(),
            token_prompt: "Access token:".into(),
            invalid_review: "Invalid review request number.".into(),
            review_failed: "Could not fetch the review request.".into(),
            empty_token: "An access token is required.".into(),
            rate_limited: "You have exceeded the rate limit of {max} concurrent sessions. \
                           Please wait for existing sessions to clean up."
                .into(),
            unavailable: "Service temporarily unavailable, please try again later.".into(),
            provisioning: "Provisioning environment...".into(),
            provision_failed: "Failed to provision environment :(".into(),
            attaching: "Attaching to environment...".into(),
            attach_failed: "Lost connection to environment.".into(),
        }
    }
}

impl SessionMessages {
    pub fn rate_limited(&self, max: usize) -> String {
        self.rate_limited.replace("{max}", &max.to_string())
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Attached and the remote side closed normally.
    Completed,
    /// Client went away during the prompts.
    Disconnected,
    UnknownPeer,
    InvalidReview,
    ReviewUnavailable,
    EmptyToken,
    RateLimited,
    /// Admission could not be checked.
    AdmissionUnavailable,
    ProvisionFailed,
    AttachFailed,
}

/// Drives one interactive session from the first prompt to runner cleanup.
#[derive(Clone)]
pub struct SessionHandler {
    orchestrator: Orchestrator,
    reviews: Arc<dyn ReviewSource>,
    messages: SessionMessages,
}

impl SessionHandler {
    pub fn new(orchestrator: Orchestrator, reviews: Arc<dyn ReviewSource>) -> Self {
        Self {
            orchestrator,
            reviews,
            messages: SessionMessages::default(),
        }
    }

    pub fn with_messages(mut self, messages: SessionMessages) -> Self {
        self.messages = messages;
        self
    }

    /// Run the session on `io`. Transport failures before provisioning end it with `Err`;
    /// once a runner exists it is always destroyed, whatever happens on `io`.
    #[instrument(name = "session", skip_all, fields(peer = %io.peer()))]
    pub async fn handle<S: SessionIo>(&self, mut io: S) -> Result<SessionOutcome, SessionError> {
        let msg = &self.messages;

        let Ok(origin) = Origin::new(io.peer()) else {
            io.write_line(&msg.unavailable).await?;
            return Ok(SessionOutcome::UnknownPeer);
        };

        let Some(raw) = io.prompt(&msg.review_prompt).await? else {
            return Ok(SessionOutcome::Disconnected);
        };
        let number = match raw.trim().parse::<u64>() {
            Ok(n) if n > 0 => n,
            _ => {
                io.write_line(&msg.invalid_review).await?;
                return Ok(SessionOutcome::InvalidReview);
            }
        };

        let review = match self.reviews.lookup(number).await {
            Ok(review) => review,
            Err(e) => {
                warn!(number, error = %e, "review lookup failed");
                io.write_line(&msg.review_failed).await?;
                return Ok(SessionOutcome::ReviewUnavailable);
            }
        };

        let Some(token) = io.prompt(&msg.token_prompt).await? else {
            return Ok(SessionOutcome::Disconnected);
        };
        let token = AccessToken::new(token.trim());
        if token.is_empty() {
            io.write_line(&msg.empty_token).await?;
            return Ok(SessionOutcome::EmptyToken);
        }

        match self.orchestrator.can_provision(&origin).await {
            Ok(true) => {}
            Ok(false) => {
                let max = self.orchestrator.admission().max_concurrent();
                info!(%origin, max, "rate limited");
                io.write_line(&msg.rate_limited(max)).await?;
                return Ok(SessionOutcome::RateLimited);
            }
            Err(e) => {
                error!(error = %e, "admission check failed");
                io.write_line(&msg.unavailable).await?;
                return Ok(SessionOutcome::AdmissionUnavailable);
            }
        }

        io.write_line(&msg.provisioning).await?;
        let req = ProvisionRequest::new(review.clone_url, review.branch, origin, token);
        let lease = match self.orchestrator.provision_lease(&req).await {
            Ok(lease) => lease,
            Err(_) => {
                io.write_line(&msg.provision_failed).await?;
                return Ok(SessionOutcome::ProvisionFailed);
            }
        };

        // From here on the lease must reach `release`; `io` errors are only logged.
        if let Err(e) = io.write_line(&msg.attaching).await {
            warn!(error = %e, "client write failed");
        }
        let attached = self.orchestrator.attach(lease.runner(), &mut io).await;
        if let Err(e) = lease.release().await {
            warn!(error = %e, "runner left for the reconciler");
        }

        match attached {
            Ok(()) => Ok(SessionOutcome::Completed),
            Err(_) => {
                if let Err(e) = io.write_line(&msg.attach_failed).await {
                    warn!(error = %e, "client write failed");
                }
                Ok(SessionOutcome::AttachFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use runbox_model::{ComputeUnit, RunnerId, UnitPhase, selector::unit_labels};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    use super::*;
    use crate::{
        OrchestratorConfig,
        cluster::{FakeCluster, FakeOp},
        session::{LineSession, ReviewError, ReviewRef},
    };

    struct Reviews(Option<ReviewRef>);

    #[async_trait]
    impl ReviewSource for Reviews {
        async fn lookup(&self, number: u64) -> Result<ReviewRef, ReviewError> {
            self.0.clone().ok_or(ReviewError::NotFound(number))
        }
    }

    fn handler(fake: &FakeCluster, review: Option<ReviewRef>) -> SessionHandler {
        SessionHandler::new(
            Orchestrator::new(Arc::new(fake.clone()), OrchestratorConfig::default()),
            Arc::new(Reviews(review)),
        )
    }

    fn review() -> Option<ReviewRef> {
        Some(ReviewRef {
            clone_url: "https://github.com/acme/tool.git".into(),
            branch: "fix/typo".into(),
        })
    }

    /// Feed `input` to a session from `peer`, run it to the end and collect its output.
    async fn run(handler: SessionHandler, peer: &str, input: &[u8]) -> (SessionOutcome, String) {
        let (mut client, server): (DuplexStream, DuplexStream) = tokio::io::duplex(4096);
        let session = LineSession::new(server, peer);
        let task = tokio::spawn(async move { handler.handle(session).await });

        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        (task.await.unwrap().unwrap(), out)
    }

    #[tokio::test]
    async fn full_session_attaches_and_cleans_up() {
        let fake = FakeCluster::new();
        fake.set_attach_banner("$ ");

        let (outcome, out) = run(handler(&fake, review()), "10.0.0.5", b"42\ntok\nls\n").await;

        assert_eq!(outcome, SessionOutcome::Completed);
        assert!(out.starts_with("Review request #: Access token: Provisioning environment...\r\n"));
        assert!(out.contains("Attaching to environment...\r\n$ ls\n"));
        assert!(fake.unit_names().is_empty());
        assert!(fake.credential_names().is_empty());
    }

    #[tokio::test]
    async fn client_at_the_cap_is_rate_limited() {
        let fake = FakeCluster::new();
        let origin = Origin::new("10.0.0.5:51322").unwrap();
        for raw in ["aaaaaaaaaa", "bbbbbbbbbb", "cccccccccc"] {
            let id = RunnerId::new(raw).unwrap();
            fake.insert_unit(ComputeUnit {
                name: id.unit_name(),
                labels: unit_labels(&id, &origin),
                phase: UnitPhase::Running,
                created_at: None,
                container: "runner".into(),
            });
        }

        let (outcome, out) = run(handler(&fake, review()), "10.0.0.5:51322", b"42\ntok\n").await;

        assert_eq!(outcome, SessionOutcome::RateLimited);
        assert!(out.ends_with(
            "You have exceeded the rate limit of 3 concurrent sessions. \
             Please wait for existing sessions to clean up.\r\n"
        ));
        assert_eq!(fake.calls(FakeOp::CreateCredential), 0);
    }

    #[tokio::test]
    async fn non_numeric_review_is_rejected_before_any_cluster_call() {
        let fake = FakeCluster::new();
        let (outcome, out) = run(handler(&fake, review()), "10.0.0.5", b"abc\n").await;

        assert_eq!(outcome, SessionOutcome::InvalidReview);
        assert!(out.ends_with("Invalid review request number.\r\n"));
        assert_eq!(fake.total_calls(), 0);
    }

    #[tokio::test]
    async fn review_lookup_failure_ends_the_session() {
        let fake = FakeCluster::new();
        let (outcome, _) = run(handler(&fake, None), "10.0.0.5", b"42\n").await;

        assert_eq!(outcome, SessionOutcome::ReviewUnavailable);
        assert_eq!(fake.total_calls(), 0);
    }

    #[tokio::test]
    async fn disconnect_at_a_prompt() {
        let fake = FakeCluster::new();
        let (outcome, _) = run(handler(&fake, review()), "10.0.0.5", b"42\n").await;
        assert_eq!(outcome, SessionOutcome::Disconnected);
    }

    #[tokio::test]
    async fn provision_failure_is_reported() {
        let fake = FakeCluster::new();
        fake.fail(FakeOp::CreateUnit);

        let (outcome, out) = run(handler(&fake, review()), "10.0.0.5", b"42\ntok\n").await;
        assert_eq!(outcome, SessionOutcome::ProvisionFailed);
        assert!(out.ends_with("Failed to provision environment :(\r\n"));
    }

    #[tokio::test]
    async fn attach_failure_still_destroys_the_runner() {
        let fake = FakeCluster::new();
        fake.fail(FakeOp::Attach);

        let (outcome, out) = run(handler(&fake, review()), "10.0.0.5", b"42\ntok\n").await;
        assert_eq!(outcome, SessionOutcome::AttachFailed);
        assert!(out.ends_with("Lost connection to environment.\r\n"));
        assert!(fake.unit_names().is_empty());
        assert!(fake.credential_names().is_empty());
    }

    #[test]
    fn rate_limit_message_renders_the_cap() {
        let m = SessionMessages::default();
        assert!(m.rate_limited(5).contains("rate limit of 5 concurrent"));
    }
}
