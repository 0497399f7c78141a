use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "assemble-server";

/// Parameters for opening a pull request.
#[derive(Debug, Clone, Serialize)]
pub struct PullRequestParams {
    pub title: String,
    pub body: String,
    pub base: String,
    pub head: String,
    pub maintainer_can_modify: bool,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    html_url: String,
}

/// The slice of the GitHub REST API the staging pipeline depends on.
///
/// A trait so the pipeline can be exercised against a recording double; the
/// production implementation is [`GitHubClient`].
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Login of the user the token belongs to (`GET /user`).
    async fn authenticated_user(&self, token: &str) -> anyhow::Result<String>;

    /// Fork `owner/repo` under the authenticated user. GitHub treats an
    /// existing fork as a no-op.
    async fn create_fork(&self, token: &str, owner: &str, repo: &str) -> anyhow::Result<()>;

    /// Default branch of `owner/repo`.
    async fn default_branch(&self, token: &str, owner: &str, repo: &str)
    -> anyhow::Result<String>;

    /// Open a pull request against `owner/repo`; returns its web URL.
    async fn create_pull_request(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        params: PullRequestParams,
    ) -> anyhow::Result<String>;
}

/// reqwest-backed GitHub REST v3 client.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GitHubClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: GITHUB_API_URL.to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, token: &str, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
    }
}

/// Surface non-2xx responses with the response body text, which GitHub fills
/// with a useful diagnostic.
async fn checked(resp: reqwest::Response, what: &str) -> anyhow::Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("GitHub {what} failed ({status}): {body}");
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn authenticated_user(&self, token: &str) -> anyhow::Result<String> {
        let resp = self
            .request(reqwest::Method::GET, token, "/user")
            .send()
            .await
            .context("Failed to send identity request to GitHub")?;
        let user: GitHubUser = checked(resp, "identity lookup")
            .await?
            .json()
            .await
            .context("Failed to parse identity response from GitHub")?;
        Ok(user.login)
    }

    async fn create_fork(&self, token: &str, owner: &str, repo: &str) -> anyhow::Result<()> {
        let resp = self
            .request(
                reqwest::Method::POST,
                token,
                &format!("/repos/{owner}/{repo}/forks"),
            )
            .send()
            .await
            .context("Failed to send fork request to GitHub")?;
        checked(resp, "fork").await?;
        Ok(())
    }

    async fn default_branch(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> anyhow::Result<String> {
        let resp = self
            .request(reqwest::Method::GET, token, &format!("/repos/{owner}/{repo}"))
            .send()
            .await
            .context("Failed to send repo request to GitHub")?;
        let meta: GitHubRepo = checked(resp, "repo lookup")
            .await?
            .json()
            .await
            .context("Failed to parse repo response from GitHub")?;
        Ok(meta.default_branch)
    }

    async fn create_pull_request(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        params: PullRequestParams,
    ) -> anyhow::Result<String> {
        let resp = self
            .request(
                reqwest::Method::POST,
                token,
                &format!("/repos/{owner}/{repo}/pulls"),
            )
            .json(&params)
            .send()
            .await
            .context("Failed to send pull request to GitHub")?;
        let pr: PullRequest = checked(resp, "pull request creation")
            .await?
            .json()
            .await
            .context("Failed to parse pull request response from GitHub")?;
        Ok(pr.html_url)
    }
}
