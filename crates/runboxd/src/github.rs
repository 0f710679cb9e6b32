use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, header};
use serde::Deserialize;
use tracing::debug;

use runbox_core::session::{ReviewError, ReviewRef, ReviewSource};

/// Where pull requests are looked up.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".into(),
            owner: String::new(),
            repo: String::new(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    head: Head,
}

#[derive(Debug, Deserialize)]
struct Head {
    #[serde(rename = "ref")]
    branch: String,
    /// `null` once the fork behind the pull request was deleted.
    repo: Option<HeadRepo>,
}

#[derive(Debug, Deserialize)]
struct HeadRepo {
    clone_url: String,
}

impl TryFrom<PullRequest> for ReviewRef {
    type Error = ReviewError;

    fn try_from(pr: PullRequest) -> Result<Self, Self::Error> {
        let repo = pr
            .head
            .repo
            .ok_or_else(|| ReviewError::Invalid("head repository no longer exists".into()))?;
        Ok(ReviewRef {
            clone_url: repo.clone_url,
            branch: pr.head.branch,
        })
    }
}

/// [`ReviewSource`] backed by the GitHub pulls API.
pub struct GithubReviews {
    client: reqwest::Client,
    config: GithubConfig,
}

impl GithubReviews {
    pub fn new(config: GithubConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("runboxd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn pull_url(&self, number: u64) -> String {
        format!(
            "{}/repos/{}/{}/pulls/{number}",
            self.config.api_base.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
        )
    }
}

#[async_trait]
impl ReviewSource for GithubReviews {
    async fn lookup(&self, number: u64) -> Result<ReviewRef, ReviewError> {
        let url = self.pull_url(number);
        let mut request = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ReviewError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(ReviewError::NotFound(number)),
            status if !status.is_success() => {
                return Err(ReviewError::Unavailable(format!("{url} answered {status}")));
            }
            _ => {}
        }

        let pr: PullRequest = response
            .json()
            .await
            .map_err(|e| ReviewError::Invalid(e.to_string()))?;
        debug!(number, branch = %pr.head.branch, "review resolved");
        pr.try_into()
    }
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, http::StatusCode as AxumStatus, routing::get};
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;

    async fn fake_api() -> String {
        let app = Router::new()
            .route(
                "/repos/acme/tool/pulls/42",
                get(|| async {
                    Json(json!({
                        "number": 42,
                        "head": {
                            "ref": "fix/typo",
                            "repo": { "clone_url": "https://github.com/jdoe/tool.git" }
                        }
                    }))
                }),
            )
            .route(
                "/repos/acme/tool/pulls/7",
                get(|| async { Json(json!({ "head": { "ref": "gone", "repo": null } })) }),
            )
            .route(
                "/repos/acme/tool/pulls/500",
                get(|| async { AxumStatus::BAD_GATEWAY }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}/")
    }

    async fn reviews() -> GithubReviews {
        GithubReviews::new(GithubConfig {
            api_base: fake_api().await,
            owner: "acme".into(),
            repo: "tool".into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn resolves_head_branch_and_clone_url() {
        let review = reviews().await.lookup(42).await.unwrap();
        assert_eq!(review.branch, "fix/typo");
        assert_eq!(review.clone_url, "https://github.com/jdoe/tool.git");
    }

    #[tokio::test]
    async fn unknown_number_is_not_found() {
        let err = reviews().await.lookup(9).await.unwrap_err();
        assert!(matches!(err, ReviewError::NotFound(9)));
    }

    #[tokio::test]
    async fn deleted_fork_is_invalid() {
        let err = reviews().await.lookup(7).await.unwrap_err();
        assert!(matches!(err, ReviewError::Invalid(_)));
    }

    #[tokio::test]
    async fn upstream_errors_are_unavailable() {
        let err = reviews().await.lookup(500).await.unwrap_err();
        assert!(matches!(err, ReviewError::Unavailable(_)));
    }

    #[test]
    fn pull_url_ignores_trailing_slash() {
        let reviews = GithubReviews::new(GithubConfig {
            api_base: "https://ghe.example.com/api/v3/".into(),
            owner: "acme".into(),
            repo: "tool".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            reviews.pull_url(3),
            "https://ghe.example.com/api/v3/repos/acme/tool/pulls/3"
        );
    }
}
