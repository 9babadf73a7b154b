use std::sync::Arc;

use cairn_core::{
    digest_marker, DigestError, DigestRequest, MessageRecord, RetryPolicy, RunIdentity,
};
use cairn_github::{
    AutomationIdentity, GithubClientConfig, GithubCommentClient, RepoRef, SyncOutcome,
};
use cairn_runtime::DigestPipeline;
use cairn_store::{ConflictCode, InMemoryMessageStore, StoreError};
use chrono::{Duration, Utc};
use httpmock::prelude::*;
use serde_json::json;

const SHA: &str = "3f2a9c1";
const COMMENTS_PATH: &str = "/repos/octo/widgets/issues/12/comments";

fn github_client(server: &MockServer) -> Arc<GithubCommentClient> {
    let mut config = GithubClientConfig::new(
        "integration-token",
        RepoRef::parse("octo/widgets").expect("repo"),
    );
    config.api_base = server.base_url();
    config.request_timeout_ms = 2_000;
    config.retry_max_attempts = 1;
    config.retry_base_delay_ms = 1;
    Arc::new(GithubCommentClient::new(config).expect("client"))
}

fn pipeline(
    store: Arc<InMemoryMessageStore>,
    server: &MockServer,
    max_retries: u32,
) -> DigestPipeline {
    DigestPipeline::new(
        store,
        github_client(server),
        AutomationIdentity::AnyBot,
        RetryPolicy::new(max_retries, 1).expect("policy"),
    )
}

fn request(source: &str, run_id: u64, run_attempt: u32, body: &str) -> DigestRequest {
    DigestRequest {
        pr_number: 12,
        commit_sha: SHA.to_string(),
        source_key: source.to_string(),
        body: body.to_string(),
        run: RunIdentity::new(run_id, run_attempt),
    }
}

fn lock_conflict() -> StoreError {
    StoreError::TransientConflict {
        code: ConflictCode::LockNotAvailable,
        message: "canceling statement due to lock timeout".to_string(),
    }
}

#[tokio::test]
async fn integration_first_message_creates_marked_comment() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET).path(COMMENTS_PATH);
        then.status(200).json_body(json!([
            {"id": 1, "body": "looks good", "user": {"login": "alice", "type": "User"}}
        ]));
    });
    let create = server.mock(|when, then| {
        when.method(POST)
            .path(COMMENTS_PATH)
            .body_includes("cairn-digest: commit")
            .body_includes("<code>ci/test(os=linux)</code> | run 500 | attempt 1");
        then.status(201).json_body(json!({
            "id": 77,
            "body": "digest",
            "user": {"login": "github-actions[bot]", "type": "Bot"}
        }));
    });

    let store = Arc::new(InMemoryMessageStore::new());
    let report = pipeline(Arc::clone(&store), &server, 3)
        .publish(request("ci/test(os=linux)", 500, 1, "all green"))
        .await
        .expect("publish");

    assert_eq!(report.sync, SyncOutcome::Created { comment_id: 77 });
    assert_eq!(report.resolved_sources, vec!["ci/test(os=linux)"]);
    list.assert_calls(1);
    create.assert_calls(1);
}

#[tokio::test]
async fn integration_sequential_producers_share_one_comment() {
    let server = MockServer::start();
    let store = Arc::new(InMemoryMessageStore::new());
    let pipeline = pipeline(Arc::clone(&store), &server, 3);

    let mut empty_list = server.mock(|when, then| {
        when.method(GET).path(COMMENTS_PATH);
        then.status(200).json_body(json!([]));
    });
    let create = server.mock(|when, then| {
        when.method(POST).path(COMMENTS_PATH);
        then.status(201).json_body(json!({
            "id": 90,
            "body": "digest",
            "user": {"login": "github-actions[bot]", "type": "Bot"}
        }));
    });
    pipeline
        .publish(request("ci/test", 500, 1, "tests passed"))
        .await
        .expect("first publish");
    empty_list.assert_calls(1);
    empty_list.delete();

    let existing_body = format!("{}\nstale digest", digest_marker(SHA));
    let list_with_digest = server.mock(|when, then| {
        when.method(GET).path(COMMENTS_PATH);
        then.status(200).json_body(json!([
            {"id": 90, "body": existing_body, "user": {"login": "github-actions[bot]", "type": "Bot"}}
        ]));
    });
    let update = server.mock(|when, then| {
        when.method(PATCH)
            .path("/repos/octo/widgets/issues/comments/90")
            .body_includes("tests passed")
            .body_includes("lint clean");
        then.status(200).json_body(json!({
            "id": 90,
            "body": "digest",
            "user": {"login": "github-actions[bot]", "type": "Bot"}
        }));
    });
    let report = pipeline
        .publish(request("ci/lint", 500, 1, "lint clean"))
        .await
        .expect("second publish");

    assert_eq!(report.sync, SyncOutcome::Updated { comment_id: 90 });
    assert_eq!(report.resolved_sources, vec!["ci/test", "ci/lint"]);
    list_with_digest.assert_calls(1);
    create.assert_calls(1);
    update.assert_calls(1);
}

#[tokio::test]
async fn integration_rerun_supersedes_earlier_attempt_in_document() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(COMMENTS_PATH);
        then.status(200).json_body(json!([]));
    });
    let create = server.mock(|when, then| {
        when.method(POST)
            .path(COMMENTS_PATH)
            .body_includes("attempt 2")
            .body_includes("fixed on rerun");
        then.status(201).json_body(json!({
            "id": 5,
            "body": "digest",
            "user": {"login": "github-actions[bot]", "type": "Bot"}
        }));
    });

    let store = Arc::new(InMemoryMessageStore::new());
    // Earlier attempt recorded by a runner whose clock ran an hour ahead.
    store
        .seed(MessageRecord {
            id: 0,
            pr_number: 12,
            commit_sha: SHA.to_string(),
            source_key: "ci/test".to_string(),
            body: "flaky failure".to_string(),
            created_at: Utc::now() + Duration::hours(1),
            run: RunIdentity::new(500, 1),
        })
        .await;
    let pipeline = pipeline(Arc::clone(&store), &server, 3);

    let report = pipeline
        .publish(request("ci/test", 500, 2, "fixed on rerun"))
        .await
        .expect("rerun publish");
    assert_eq!(report.resolved_sources, vec!["ci/test"]);
    assert_eq!(store.rows().await.len(), 2);
    create.assert_calls(1);
}

#[tokio::test]
async fn integration_transient_conflict_retries_without_duplicate_rows_or_comments() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET).path(COMMENTS_PATH);
        then.status(200).json_body(json!([]));
    });
    let create = server.mock(|when, then| {
        when.method(POST).path(COMMENTS_PATH);
        then.status(201).json_body(json!({
            "id": 6,
            "body": "digest",
            "user": {"login": "github-actions[bot]", "type": "Bot"}
        }));
    });

    let store = Arc::new(InMemoryMessageStore::new());
    store.inject_failure(lock_conflict()).await;
    let report = pipeline(Arc::clone(&store), &server, 3)
        .publish(request("ci/test", 500, 1, "tests passed"))
        .await
        .expect("publish after retry");

    assert_eq!(report.attempts, 2);
    assert_eq!(store.rows().await.len(), 1);
    list.assert_calls(1);
    create.assert_calls(1);
}

#[tokio::test]
async fn integration_persistent_conflict_exhausts_retries_before_github() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET).path(COMMENTS_PATH);
        then.status(200).json_body(json!([]));
    });

    let store = Arc::new(InMemoryMessageStore::new());
    for _ in 0..3 {
        store.inject_failure(lock_conflict()).await;
    }
    let error = pipeline(Arc::clone(&store), &server, 3)
        .publish(request("ci/test", 500, 1, "tests passed"))
        .await
        .expect_err("exhausted");

    assert!(matches!(
        error,
        DigestError::RetriesExhausted { attempts: 3, .. }
    ));
    assert_eq!(store.attempts().await, 3);
    assert!(store.rows().await.is_empty());
    list.assert_calls(0);
}
