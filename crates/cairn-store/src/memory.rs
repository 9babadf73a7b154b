//! In-memory `MessageStore` used by tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use cairn_core::{resolve_latest_per_source, DigestRequest, MessageRecord};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::{MessageStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct InMemoryState {
    rows: Vec<MessageRecord>,
    next_id: i64,
    last_created_at: Option<DateTime<Utc>>,
    injected_failures: VecDeque<StoreError>,
    attempts: usize,
}

impl InMemoryState {
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let created_at = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(created_at);
        created_at
    }
}

/// Append-only log held behind one async mutex, so every append-resolve runs
/// exclusively. Queued failures are returned before any write, mirroring an
/// attempt that rolled back.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `error` to be returned by the next append-resolve attempt.
    pub async fn inject_failure(&self, error: StoreError) {
        self.state.lock().await.injected_failures.push_back(error);
    }

    /// Inserts a pre-built row verbatim, keeping its `created_at`.
    pub async fn seed(&self, mut record: MessageRecord) {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        record.id = state.next_id;
        state.rows.push(record);
    }

    /// Snapshot of every committed row in insertion order.
    pub async fn rows(&self) -> Vec<MessageRecord> {
        self.state.lock().await.rows.clone()
    }

    /// Number of append-resolve attempts made, failed ones included.
    pub async fn attempts(&self) -> usize {
        self.state.lock().await.attempts
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append_and_resolve(&self, request: DigestRequest) -> StoreResult<Vec<MessageRecord>> {
        let mut state = self.state.lock().await;
        state.attempts += 1;
        if let Some(error) = state.injected_failures.pop_front() {
            return Err(error);
        }

        state.next_id += 1;
        let record = MessageRecord {
            id: state.next_id,
            pr_number: request.pr_number,
            commit_sha: request.commit_sha.clone(),
            source_key: request.source_key,
            body: request.body,
            created_at: state.next_created_at(),
            run: request.run,
        };
        state.rows.push(record);

        let scoped = state
            .rows
            .iter()
            .filter(|row| row.pr_number == request.pr_number && row.commit_sha == request.commit_sha)
            .cloned();
        Ok(resolve_latest_per_source(scoped))
    }
}
