use serde::{Deserialize, Serialize};

use crate::{DigestError, RunIdentity};

/// Everything one publish invocation carries across component boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestRequest {
    pub pr_number: u64,
    pub commit_sha: String,
    pub source_key: String,
    pub body: String,
    pub run: RunIdentity,
}

impl DigestRequest {
    /// Rejects requests that could never produce a meaningful row.
    pub fn validate(&self) -> Result<(), DigestError> {
        if self.pr_number == 0 {
            return Err(DigestError::InvalidRequest(
                "pull request number must be greater than 0".to_string(),
            ));
        }
        if self.commit_sha.trim().is_empty() {
            return Err(DigestError::InvalidRequest(
                "commit sha must not be empty".to_string(),
            ));
        }
        if self.source_key.trim().is_empty() {
            return Err(DigestError::InvalidRequest(
                "source key must not be empty".to_string(),
            ));
        }
        if self.body.trim().is_empty() {
            return Err(DigestError::InvalidRequest(
                "message body must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
