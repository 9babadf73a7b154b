//! Find-or-create of the one canonical digest comment per commit.
//!
//! The sink offers no transactions: two runs that both list before either
//! creates will each create a comment. Later runs update the first match.

use cairn_core::{digest_marker, DigestError};

use crate::comment_sink::{AutomationIdentity, CommentSink, ExternalComment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created { comment_id: u64 },
    Updated { comment_id: u64 },
    Unchanged { comment_id: u64 },
}

impl SyncOutcome {
    pub fn comment_id(&self) -> u64 {
        match self {
            Self::Created { comment_id }
            | Self::Updated { comment_id }
            | Self::Unchanged { comment_id } => *comment_id,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Unchanged { .. } => "unchanged",
        }
    }
}

/// First comment written by `identity` that carries the marker for `commit_sha`.
pub fn find_canonical_comment<'a>(
    comments: &'a [ExternalComment],
    identity: &AutomationIdentity,
    commit_sha: &str,
) -> Option<&'a ExternalComment> {
    let marker = digest_marker(commit_sha);
    comments
        .iter()
        .find(|comment| identity.authored(comment) && comment.body.contains(&marker))
}

fn collaborator_error(operation: &'static str, error: anyhow::Error) -> DigestError {
    DigestError::Collaborator {
        operation,
        message: format!("{error:#}"),
    }
}

/// Makes the canonical comment for `(pr_number, commit_sha)` hold `document`.
/// Every collaborator failure is returned as [`DigestError::Collaborator`].
pub async fn sync_digest_comment(
    sink: &dyn CommentSink,
    identity: &AutomationIdentity,
    pr_number: u64,
    commit_sha: &str,
    document: &str,
) -> Result<SyncOutcome, DigestError> {
    let comments = sink
        .list_comments(pr_number)
        .await
        .map_err(|error| collaborator_error("list", error))?;

    let outcome = match find_canonical_comment(&comments, identity, commit_sha) {
        Some(existing) if existing.body == document => SyncOutcome::Unchanged {
            comment_id: existing.id,
        },
        Some(existing) => {
            let updated = sink
                .update_comment(existing.id, document)
                .await
                .map_err(|error| collaborator_error("update", error))?;
            SyncOutcome::Updated {
                comment_id: updated.id,
            }
        }
        None => {
            let created = sink
                .create_comment(pr_number, document)
                .await
                .map_err(|error| collaborator_error("create", error))?;
            SyncOutcome::Created {
                comment_id: created.id,
            }
        }
    };

    tracing::info!(
        pr_number,
        commit_sha,
        outcome = outcome.as_str(),
        comment_id = outcome.comment_id(),
        "synced digest comment"
    );
    Ok(outcome)
}
