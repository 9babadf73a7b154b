//! Resolution of the pull request and commit the invoking job reports on.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(default)]
    pull_request: Option<PullRequestPayload>,
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    number: u64,
    #[serde(default)]
    head: Option<HeadPayload>,
}

#[derive(Debug, Deserialize)]
struct HeadPayload {
    sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestTarget {
    pub pr_number: u64,
    pub commit_sha: String,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn read_event_pull_request(event_path: &Path) -> Result<Option<PullRequestPayload>> {
    let raw = std::fs::read_to_string(event_path)
        .with_context(|| format!("failed to read event payload {}", event_path.display()))?;
    let payload: EventPayload = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse event payload {}", event_path.display()))?;
    Ok(payload.pull_request)
}

/// Explicit inputs win; the event payload fills the gaps; `GITHUB_SHA` is the
/// last resort for the commit. The payload is read only when needed.
pub fn resolve_pull_request_target(
    pr_number: Option<u64>,
    commit_sha: Option<&str>,
    github_sha: Option<&str>,
    event_path: Option<&Path>,
) -> Result<PullRequestTarget> {
    let mut pr_number = pr_number.filter(|number| *number > 0);
    let mut commit_sha = non_empty(commit_sha);

    if pr_number.is_none() || commit_sha.is_none() {
        if let Some(event_path) = event_path {
            if let Some(pull_request) = read_event_pull_request(event_path)? {
                pr_number = pr_number.or(Some(pull_request.number));
                commit_sha = commit_sha.or_else(|| {
                    pull_request
                        .head
                        .and_then(|head| non_empty(Some(head.sha.as_str())))
                });
            }
        }
    }

    let Some(pr_number) = pr_number else {
        bail!("pull request number is unknown: pass --pr-number or run on a pull_request event");
    };
    let Some(commit_sha) = commit_sha.or_else(|| non_empty(github_sha)) else {
        bail!("commit sha is unknown: pass --commit-sha or set GITHUB_SHA");
    };
    Ok(PullRequestTarget {
        pr_number,
        commit_sha,
    })
}
