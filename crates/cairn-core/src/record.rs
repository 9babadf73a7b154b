use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution that produced a message. Ordering is lexicographic over
/// `(run_id, run_attempt)`, which is what decides supersession.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunIdentity {
    pub run_id: u64,
    pub run_attempt: u32,
}

impl RunIdentity {
    pub fn new(run_id: u64, run_attempt: u32) -> Self {
        Self {
            run_id,
            run_attempt,
        }
    }
}

/// One committed row of the append-only message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub pr_number: u64,
    pub commit_sha: String,
    pub source_key: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub run: RunIdentity,
}

impl MessageRecord {
    fn supersedes(&self, current: &MessageRecord) -> bool {
        (self.run, self.created_at, self.id) > (current.run, current.created_at, current.id)
    }
}

/// Reduces a log slice for one `(pr_number, commit_sha)` pair to the current
/// record of every source, ordered by creation time for display.
///
/// Selection uses the greatest `(run_id, run_attempt)`; `created_at` and the
/// row id only break ties between rows of the same run attempt.
pub fn resolve_latest_per_source<I>(records: I) -> Vec<MessageRecord>
where
    I: IntoIterator<Item = MessageRecord>,
{
    let mut latest: BTreeMap<String, MessageRecord> = BTreeMap::new();
    for record in records {
        match latest.get(&record.source_key) {
            Some(current) if !record.supersedes(current) => {}
            _ => {
                latest.insert(record.source_key.clone(), record);
            }
        }
    }

    let mut resolved = latest.into_values().collect::<Vec<_>>();
    resolved.sort_by(|left, right| {
        left.created_at
            .cmp(&right.created_at)
            .then(left.id.cmp(&right.id))
    });
    resolved
}
