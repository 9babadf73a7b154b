use std::sync::Arc;

use cairn_core::{render_digest, DigestError, DigestRequest, RetryPolicy};
use cairn_github::{sync_digest_comment, AutomationIdentity, CommentSink, SyncOutcome};
use cairn_store::MessageStore;

use crate::retry_controller::{AttemptError, RetryController};

/// What a successful publish did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub attempts: u32,
    pub source_key: String,
    /// Source keys in the rendered document, in display order.
    pub resolved_sources: Vec<String>,
    pub sync: SyncOutcome,
}

/// Append, resolve, render, and sync for one message, inside the retry loop.
pub struct DigestPipeline {
    store: Arc<dyn MessageStore>,
    sink: Arc<dyn CommentSink>,
    identity: AutomationIdentity,
    retry: RetryController,
}

impl DigestPipeline {
    pub fn new(
        store: Arc<dyn MessageStore>,
        sink: Arc<dyn CommentSink>,
        identity: AutomationIdentity,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            sink,
            identity,
            retry: RetryController::new(retry_policy),
        }
    }

    /// Prepares the store schema, retrying transient conflicts such as a
    /// bootstrap lock timeout under the same policy as appends. Returns the
    /// number of attempts used.
    pub async fn prepare_store(&self) -> Result<u32, DigestError> {
        let retried = self
            .retry
            .run(|_| async { self.store.ensure_schema().await.map_err(AttemptError::from) })
            .await?;
        Ok(retried.attempts)
    }

    /// Publishes `request`. Once the store step of an attempt commits, the row
    /// stays appended even if the sync step then fails.
    pub async fn publish(&self, request: DigestRequest) -> Result<PublishReport, DigestError> {
        request.validate()?;

        let retried = self
            .retry
            .run(|attempt| {
                let request = request.clone();
                async move { self.publish_attempt(attempt, request).await }
            })
            .await?;

        let (resolved_sources, sync) = retried.value;
        Ok(PublishReport {
            attempts: retried.attempts,
            source_key: request.source_key,
            resolved_sources,
            sync,
        })
    }

    async fn publish_attempt(
        &self,
        attempt: u32,
        request: DigestRequest,
    ) -> Result<(Vec<String>, SyncOutcome), AttemptError> {
        let pr_number = request.pr_number;
        let commit_sha = request.commit_sha.clone();

        let resolved = self.store.append_and_resolve(request).await?;
        tracing::debug!(
            attempt,
            pr_number,
            commit_sha = %commit_sha,
            resolved = resolved.len(),
            "message appended"
        );

        let document = render_digest(&commit_sha, &resolved);
        let sync = sync_digest_comment(
            self.sink.as_ref(),
            &self.identity,
            pr_number,
            &commit_sha,
            &document,
        )
        .await?;

        let sources = resolved
            .into_iter()
            .map(|record| record.source_key)
            .collect();
        Ok((sources, sync))
    }
}
