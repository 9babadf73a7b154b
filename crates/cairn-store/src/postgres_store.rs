//! PostgreSQL-backed `MessageStore`.
//!
//! Every attempt opens its own connection and runs one transaction:
//! transaction-local timeouts, a per-`(pr_number, commit_sha)` advisory lock,
//! the insert, then the `DISTINCT ON (source)` resolve. The connection is
//! dropped when the attempt returns, whatever the outcome.

use async_trait::async_trait;
use cairn_core::{DigestRequest, MessageRecord, RunIdentity, StoreFailure};
use chrono::{DateTime, Utc};
use postgres::error::ErrorPosition;
use postgres::{Client, GenericClient, NoTls, Row, Transaction};

use crate::{MessageStore, StoreError, StoreResult};

pub const PR_COMMENTS_TABLE: &str = "pr_comments";

/// Fixed advisory lock key serializing schema bootstrap across processes.
const SCHEMA_BOOTSTRAP_LOCK_KEY: i64 = 0x6361_6972_6e00_0001;

const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresStoreConfig {
    pub database_url: String,
    /// Upper bound on waiting for the per-key lock; exceeding it raises 55P03.
    pub lock_timeout_ms: u64,
    /// Upper bound on any single statement; exceeding it raises 57014.
    pub statement_timeout_ms: u64,
}

impl PostgresStoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            statement_timeout_ms: DEFAULT_STATEMENT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresMessageStore {
    config: PostgresStoreConfig,
}

impl PostgresMessageStore {
    pub fn new(config: PostgresStoreConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    /// Creates the message table and its lookup index when missing. When both
    /// already exist no DDL runs and no table lock is taken.
    async fn ensure_schema(&self) -> StoreResult<()> {
        let config = self.config.clone();
        run_blocking(move || {
            let mut client = connect(&config)?;
            initialize_schema(&mut client, &config)
        })
        .await
    }

    async fn append_and_resolve(&self, request: DigestRequest) -> StoreResult<Vec<MessageRecord>> {
        let config = self.config.clone();
        run_blocking(move || {
            let mut client = connect(&config)?;
            append_and_resolve_in_transaction(&mut client, &config, &request)
        })
        .await
    }
}

async fn run_blocking<T, F>(work: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|error| {
        StoreError::Fatal(StoreFailure::new(format!(
            "message store worker did not complete: {error}"
        )))
    })?
}

fn connect(config: &PostgresStoreConfig) -> StoreResult<Client> {
    Client::connect(&config.database_url, NoTls)
        .map_err(|error| classify_postgres_error("failed to connect to message store", error))
}

fn schema_present(client: &mut impl GenericClient) -> StoreResult<bool> {
    let row = client
        .query_one(
            r#"
            SELECT
                to_regclass('pr_comments') IS NOT NULL,
                EXISTS (
                    SELECT 1 FROM pg_indexes
                    WHERE schemaname = current_schema()
                      AND tablename = 'pr_comments'
                      AND indexname = 'idx_pr_comments_pr_commit_source'
                )
            "#,
            &[],
        )
        .map_err(|error| classify_postgres_error("failed to inspect message schema", error))?;
    let has_table: bool = row.try_get(0).map_err(decode_error)?;
    let has_index: bool = row.try_get(1).map_err(decode_error)?;
    Ok(has_table && has_index)
}

fn initialize_schema(client: &mut Client, config: &PostgresStoreConfig) -> StoreResult<()> {
    if schema_present(client)? {
        tracing::debug!("message schema already present");
        return Ok(());
    }
    create_schema_objects(client, config)
}

/// Runs the DDL under the bootstrap advisory lock with the same bounded lock
/// and statement timeouts as appends. `CREATE INDEX` takes a share lock on the
/// table, so waiting behind in-flight inserts ends in 55P03, not a stall.
fn create_schema_objects(client: &mut Client, config: &PostgresStoreConfig) -> StoreResult<()> {
    let mut transaction = client
        .transaction()
        .map_err(|error| classify_postgres_error("failed to start schema transaction", error))?;
    apply_transaction_timeouts(&mut transaction, config)?;
    transaction
        .execute(
            "SELECT pg_advisory_xact_lock($1)",
            &[&SCHEMA_BOOTSTRAP_LOCK_KEY],
        )
        .map_err(|error| classify_postgres_error("failed to lock schema bootstrap", error))?;

    if !schema_present(&mut transaction)? {
        apply_schema_ddl(&mut transaction)?;
        tracing::info!(table = PR_COMMENTS_TABLE, "created message schema");
    }
    transaction
        .commit()
        .map_err(|error| classify_postgres_error("failed to commit message schema", error))
}

fn apply_schema_ddl(transaction: &mut Transaction<'_>) -> StoreResult<()> {
    transaction
        .batch_execute(
            r#"
            CREATE TABLE IF NOT EXISTS pr_comments (
                id BIGSERIAL PRIMARY KEY,
                pr_number BIGINT NOT NULL,
                commit_sha TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp(),
                source TEXT NOT NULL,
                run_id BIGINT NOT NULL,
                run_attempt INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pr_comments_pr_commit_source
                ON pr_comments (pr_number, commit_sha, source);
            "#,
        )
        .map_err(|error| classify_postgres_error("failed to initialize message schema", error))
}

pub(crate) fn advisory_lock_key(pr_number: u64, commit_sha: &str) -> String {
    format!("{PR_COMMENTS_TABLE}:{pr_number}:{commit_sha}")
}

fn append_and_resolve_in_transaction(
    client: &mut Client,
    config: &PostgresStoreConfig,
    request: &DigestRequest,
) -> StoreResult<Vec<MessageRecord>> {
    let pr_number = to_bigint("pr_number", request.pr_number)?;
    let run_id = to_bigint("run_id", request.run.run_id)?;
    let run_attempt = i32::try_from(request.run.run_attempt).map_err(|_| {
        StoreError::Fatal(StoreFailure::new(format!(
            "run_attempt {} exceeds postgres integer",
            request.run.run_attempt
        )))
    })?;

    let mut transaction = client
        .transaction()
        .map_err(|error| classify_postgres_error("failed to start append transaction", error))?;
    apply_transaction_timeouts(&mut transaction, config)?;

    transaction
        .execute(
            "SELECT pg_advisory_xact_lock(hashtextextended($1, 0))",
            &[&advisory_lock_key(request.pr_number, &request.commit_sha)],
        )
        .map_err(|error| classify_postgres_error("failed to lock pull request commit", error))?;

    transaction
        .execute(
            r#"
            INSERT INTO pr_comments (pr_number, commit_sha, message, source, run_id, run_attempt)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            &[
                &pr_number,
                &request.commit_sha,
                &request.body,
                &request.source_key,
                &run_id,
                &run_attempt,
            ],
        )
        .map_err(|error| classify_postgres_error("failed to append message", error))?;

    let rows = transaction
        .query(
            r#"
            SELECT id, pr_number, commit_sha, message, created_at, source, run_id, run_attempt
            FROM (
                SELECT DISTINCT ON (source)
                    id, pr_number, commit_sha, message, created_at, source, run_id, run_attempt
                FROM pr_comments
                WHERE pr_number = $1 AND commit_sha = $2
                ORDER BY source, run_id DESC, run_attempt DESC, created_at DESC, id DESC
            ) latest
            ORDER BY created_at ASC, id ASC
            "#,
            &[&pr_number, &request.commit_sha],
        )
        .map_err(|error| classify_postgres_error("failed to resolve latest messages", error))?;
    let resolved = rows
        .iter()
        .map(decode_record)
        .collect::<StoreResult<Vec<_>>>()?;

    transaction
        .commit()
        .map_err(|error| classify_postgres_error("failed to commit append transaction", error))?;

    tracing::debug!(
        pr_number = request.pr_number,
        commit_sha = %request.commit_sha,
        source = %request.source_key,
        resolved = resolved.len(),
        "appended message and resolved latest view"
    );
    Ok(resolved)
}

fn apply_transaction_timeouts(
    transaction: &mut Transaction<'_>,
    config: &PostgresStoreConfig,
) -> StoreResult<()> {
    let lock_timeout = format!("{}ms", config.lock_timeout_ms.max(1));
    let statement_timeout = format!("{}ms", config.statement_timeout_ms.max(1));
    transaction
        .execute(
            "SELECT set_config('lock_timeout', $1, true), set_config('statement_timeout', $2, true)",
            &[&lock_timeout, &statement_timeout],
        )
        .map_err(|error| classify_postgres_error("failed to apply transaction timeouts", error))?;
    Ok(())
}

fn decode_record(row: &Row) -> StoreResult<MessageRecord> {
    let id: i64 = row.try_get(0).map_err(decode_error)?;
    let pr_number: i64 = row.try_get(1).map_err(decode_error)?;
    let commit_sha: String = row.try_get(2).map_err(decode_error)?;
    let body: String = row.try_get(3).map_err(decode_error)?;
    let created_at: DateTime<Utc> = row.try_get(4).map_err(decode_error)?;
    let source_key: String = row.try_get(5).map_err(decode_error)?;
    let run_id: i64 = row.try_get(6).map_err(decode_error)?;
    let run_attempt: i32 = row.try_get(7).map_err(decode_error)?;

    Ok(MessageRecord {
        id,
        pr_number: from_bigint("pr_number", pr_number)?,
        commit_sha,
        source_key,
        body,
        created_at,
        run: RunIdentity {
            run_id: from_bigint("run_id", run_id)?,
            run_attempt: u32::try_from(run_attempt)
                .map_err(|_| invalid_persisted("run_attempt", run_attempt))?,
        },
    })
}

fn to_bigint(field: &str, value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| {
        StoreError::Fatal(StoreFailure::new(format!(
            "{field} {value} exceeds postgres bigint"
        )))
    })
}

fn from_bigint(field: &str, value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| invalid_persisted(field, value))
}

fn invalid_persisted(field: &str, value: impl std::fmt::Display) -> StoreError {
    StoreError::Fatal(StoreFailure::new(format!(
        "invalid persisted value for '{field}': {value}"
    )))
}

fn decode_error(error: postgres::Error) -> StoreError {
    classify_postgres_error("failed to decode message row", error)
}

fn render_position(position: &ErrorPosition) -> String {
    match position {
        ErrorPosition::Original(offset) => format!("original:{offset}"),
        ErrorPosition::Internal { position, query } => format!("internal:{position} in `{query}`"),
    }
}

/// Maps a driver error onto the transient/fatal split. Errors without a server
/// diagnostic (I/O, protocol, decoding) are always fatal.
fn classify_postgres_error(context: &str, error: postgres::Error) -> StoreError {
    match error.as_db_error() {
        Some(db_error) => StoreError::from_diagnostic(StoreFailure {
            code: Some(db_error.code().code().to_string()),
            message: format!("{context}: {}", db_error.message()),
            detail: db_error.detail().map(ToOwned::to_owned),
            hint: db_error.hint().map(ToOwned::to_owned),
            position: db_error.position().map(render_position),
        }),
        None => StoreError::Fatal(StoreFailure::new(format!("{context}: {error}"))),
    }
}
