//! `cairn` command: gathers the invocation from flags and the GitHub Actions
//! environment, then publishes one message through the digest pipeline.

mod bootstrap_helpers;
mod cli_args;
mod invocation;

use std::sync::Arc;

use anyhow::{Context, Result};
use cairn_core::{derive_source_key, DigestRequest, RetryPolicy, RunIdentity};
use cairn_github::{AutomationIdentity, GithubClientConfig, GithubCommentClient, RepoRef};
use cairn_runtime::DigestPipeline;
use cairn_store::{PostgresMessageStore, PostgresStoreConfig};

pub use bootstrap_helpers::init_tracing;
pub use cli_args::Cli;
pub use invocation::{resolve_pull_request_target, PullRequestTarget};

/// Builds the request context from parsed arguments. No I/O beyond reading
/// the event payload when the pull request target must come from it.
pub fn build_request(cli: &Cli) -> Result<DigestRequest> {
    let target = resolve_pull_request_target(
        cli.pr_number,
        cli.commit_sha.as_deref(),
        cli.github_sha.as_deref(),
        cli.event_path.as_deref(),
    )?;
    let source_key = derive_source_key(&cli.workflow, &cli.job, cli.matrix.as_deref());
    let request = DigestRequest {
        pr_number: target.pr_number,
        commit_sha: target.commit_sha,
        source_key: source_key.key,
        body: cli.message.clone(),
        run: RunIdentity::new(cli.run_id, cli.run_attempt),
    };
    request.validate()?;
    Ok(request)
}

pub async fn run_cli(cli: Cli) -> Result<()> {
    let request = build_request(&cli)?;
    let retry_policy = RetryPolicy::new(cli.max_retries, cli.retry_delay_ms)?;
    let repo = RepoRef::parse(&cli.repository)?;

    let store = PostgresMessageStore::new(PostgresStoreConfig {
        database_url: cli.database_url.clone(),
        lock_timeout_ms: cli.lock_timeout_ms,
        statement_timeout_ms: cli.statement_timeout_ms,
    });

    let mut github_config = GithubClientConfig::new(cli.github_token.clone(), repo);
    github_config.api_base = cli.github_api_base.clone();
    github_config.request_timeout_ms = cli.request_timeout_ms;
    github_config.page_size = cli.comment_page_size;
    github_config.max_pages = cli.comment_max_pages;
    let github = GithubCommentClient::new(github_config)?;

    let pipeline = DigestPipeline::new(
        Arc::new(store),
        Arc::new(github),
        AutomationIdentity::from_bot_login(cli.bot_login.as_deref()),
        retry_policy,
    );
    pipeline
        .prepare_store()
        .await
        .context("failed to prepare message store schema")?;

    tracing::info!(
        pr_number = request.pr_number,
        commit_sha = %request.commit_sha,
        source = %request.source_key,
        run_id = request.run.run_id,
        run_attempt = request.run.run_attempt,
        "publishing message"
    );
    let report = pipeline
        .publish(request)
        .await
        .context("failed to publish message digest")?;
    tracing::info!(
        attempts = report.attempts,
        source = %report.source_key,
        sources = report.resolved_sources.len(),
        outcome = report.sync.as_str(),
        comment_id = report.sync.comment_id(),
        "message digest published"
    );
    Ok(())
}
