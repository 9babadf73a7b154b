use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::comment_sink::{CommentSink, ExternalComment};
use crate::github_transport_helpers::{
    parse_retry_after, transport_retry_delay, truncate_for_error, CommentRequest,
};

pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
pub const MAX_COMMENT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (owner, name) = trimmed
            .split_once('/')
            .ok_or_else(|| anyhow!("invalid repository '{raw}', expected owner/repo"))?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            bail!("invalid repository '{raw}', expected owner/repo");
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn as_slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct GithubClientConfig {
    pub api_base: String,
    pub token: String,
    pub repo: RepoRef,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    /// Comments requested per page, clamped to 1..=100.
    pub page_size: u32,
    /// Listing stops after this many pages even if more exist.
    pub max_pages: u32,
}

impl GithubClientConfig {
    pub fn new(token: impl Into<String>, repo: RepoRef) -> Self {
        Self {
            api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            token: token.into(),
            repo,
            request_timeout_ms: 10_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            page_size: MAX_COMMENT_PAGE_SIZE,
            max_pages: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubIssueComment {
    id: u64,
    #[serde(default)]
    body: Option<String>,
    user: Option<GithubUser>,
}

impl From<GithubIssueComment> for ExternalComment {
    fn from(comment: GithubIssueComment) -> Self {
        let (author_login, author_is_bot) = match comment.user {
            Some(user) => {
                let is_bot = user.kind.as_deref() == Some("Bot");
                (user.login, is_bot)
            }
            None => (String::new(), false),
        };
        Self {
            id: comment.id,
            author_login,
            author_is_bot,
            body: comment.body.unwrap_or_default(),
        }
    }
}

/// Issue-comment client for one repository. Pull request conversation
/// comments are issue comments in the GitHub REST API.
#[derive(Clone)]
pub struct GithubCommentClient {
    http: reqwest::Client,
    api_base: String,
    repo: RepoRef,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
    page_size: u32,
    max_pages: u32,
}

impl GithubCommentClient {
    pub fn new(config: GithubClientConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("cairn-digest"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", config.token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid github authorization header")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http: client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            repo: config.repo,
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
            page_size: config.page_size.clamp(1, MAX_COMMENT_PAGE_SIZE),
            max_pages: config.max_pages.max(1),
        })
    }

    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    async fn list_issue_comments(&self, issue_number: u64) -> Result<Vec<GithubIssueComment>> {
        let mut page = 1_u32;
        let mut rows = Vec::new();
        let per_page = self.page_size.to_string();
        loop {
            let page_value = page.to_string();
            let chunk: Vec<GithubIssueComment> = self
                .request_json("list issue comments", CommentRequest::Idempotent, || {
                    self.http
                        .get(format!(
                            "{}/repos/{}/{}/issues/{}/comments",
                            self.api_base, self.repo.owner, self.repo.name, issue_number
                        ))
                        .query(&[
                            ("sort", "created"),
                            ("direction", "asc"),
                            ("per_page", per_page.as_str()),
                            ("page", page_value.as_str()),
                        ])
                })
                .await?;
            let chunk_len = chunk.len();
            rows.extend(chunk);
            if chunk_len < self.page_size as usize {
                break;
            }
            if page >= self.max_pages {
                tracing::warn!(
                    issue_number,
                    pages = page,
                    "stopped listing comments at page limit"
                );
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(rows)
    }

    /// Sends one request, retrying inside the client only where `kind` makes a
    /// repeat safe.
    async fn request_json<T, F>(
        &self,
        operation: &str,
        kind: CommentRequest,
        mut request_builder: F,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder().send().await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed = response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode github {operation}"))?;
                        return Ok(parsed);
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts && kind.retries_status(status.as_u16()) {
                        tokio::time::sleep(transport_retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    bail!(
                        "github api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && kind.retries_transport_error(&error) {
                        tokio::time::sleep(transport_retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            None,
                        ))
                        .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("github api {operation} request failed"));
                }
            }
        }
    }
}

#[async_trait]
impl CommentSink for GithubCommentClient {
    async fn list_comments(&self, pr_number: u64) -> Result<Vec<ExternalComment>> {
        let comments = self.list_issue_comments(pr_number).await?;
        Ok(comments.into_iter().map(ExternalComment::from).collect())
    }

    async fn create_comment(&self, pr_number: u64, body: &str) -> Result<ExternalComment> {
        let payload = json!({ "body": body });
        let created: GithubIssueComment = self
            .request_json("create issue comment", CommentRequest::Create, || {
                self.http
                    .post(format!(
                        "{}/repos/{}/{}/issues/{}/comments",
                        self.api_base, self.repo.owner, self.repo.name, pr_number
                    ))
                    .json(&payload)
            })
            .await?;
        Ok(created.into())
    }

    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<ExternalComment> {
        let payload = json!({ "body": body });
        let updated: GithubIssueComment = self
            .request_json("update issue comment", CommentRequest::Idempotent, || {
                self.http
                    .patch(format!(
                        "{}/repos/{}/{}/issues/comments/{}",
                        self.api_base, self.repo.owner, self.repo.name, comment_id
                    ))
                    .json(&payload)
            })
            .await?;
        Ok(updated.into())
    }
}
