//! Append-only message log with the append-resolve transaction.
//!
//! Two backends implement [`MessageStore`]: PostgreSQL for real deployments
//! and an in-memory log with the same per-key exclusion for tests.

use std::fmt;

use async_trait::async_trait;
use cairn_core::{DigestRequest, MessageRecord, StoreFailure};
use thiserror::Error;

mod memory;
mod postgres_store;

pub use memory::InMemoryMessageStore;
pub use postgres_store::{PostgresMessageStore, PostgresStoreConfig, PR_COMMENTS_TABLE};

/// Result type for one store attempt.
pub type StoreResult<T> = Result<T, StoreError>;

/// Server-reported conditions that are expected to clear on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictCode {
    LockNotAvailable,
    DeadlockDetected,
    QueryCanceled,
    SerializationFailure,
}

impl ConflictCode {
    pub fn from_sqlstate(code: &str) -> Option<Self> {
        match code {
            "55P03" => Some(Self::LockNotAvailable),
            "40P01" => Some(Self::DeadlockDetected),
            "57014" => Some(Self::QueryCanceled),
            "40001" => Some(Self::SerializationFailure),
            _ => None,
        }
    }

    pub fn sqlstate(self) -> &'static str {
        match self {
            Self::LockNotAvailable => "55P03",
            Self::DeadlockDetected => "40P01",
            Self::QueryCanceled => "57014",
            Self::SerializationFailure => "40001",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LockNotAvailable => "lock_not_available",
            Self::DeadlockDetected => "deadlock_detected",
            Self::QueryCanceled => "query_canceled",
            Self::SerializationFailure => "serialization_failure",
        }
    }
}

impl fmt::Display for ConflictCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.sqlstate(), self.as_str())
    }
}

/// Outcome classification of a failed append-resolve attempt. Any failed
/// attempt has been rolled back; nothing was appended.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("transient conflict {code}: {message}")]
    TransientConflict { code: ConflictCode, message: String },
    #[error("{0}")]
    Fatal(StoreFailure),
}

impl StoreError {
    /// Classifies a server diagnostic by SQLSTATE.
    pub fn from_diagnostic(failure: StoreFailure) -> Self {
        match failure.code.as_deref().and_then(ConflictCode::from_sqlstate) {
            Some(code) => Self::TransientConflict {
                code,
                message: failure.message,
            },
            None => Self::Fatal(failure),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientConflict { .. })
    }
}

/// Storage contract for the message log.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Prepares backing storage before the first append. Failures use the same
    /// transient/fatal split as appends.
    async fn ensure_schema(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Atomically appends `request` as a new row, then returns the latest
    /// record per source for the same `(pr_number, commit_sha)`, ordered by
    /// creation time. The returned view includes every row committed before
    /// this attempt's own insert became visible.
    async fn append_and_resolve(&self, request: DigestRequest) -> StoreResult<Vec<MessageRecord>>;
}
