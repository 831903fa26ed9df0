//! Integration tests for `BatchCommitExecutor`.
//!
//! The executor runs against a failure-injecting wrapper around the
//! in-memory store, so batch failures, retries and cancellation can be
//! provoked deterministically.

mod common;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use recordport_core::duplicate_detection::{CommitPlan, RecordWrite};
use recordport_core::record::RecordKind;
use recordport_core::store::StoreError;
use recordport_pipeline::retry::RetryConfig;
use recordport_pipeline::{BatchCommitExecutor, BatchProgress, ExecutorOptions};

use common::{actor, contact_records, fields, FlakyStore};

fn options(batch_size: usize) -> ExecutorOptions {
    ExecutorOptions {
        batch_size,
        ..ExecutorOptions::default()
    }
}

fn retrying(batch_size: usize, max_retries: u32) -> ExecutorOptions {
    ExecutorOptions {
        batch_size,
        inter_batch_delay: Duration::ZERO,
        retry: RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            ..RetryConfig::default()
        },
    }
}

fn drain(mut rx: mpsc::Receiver<BatchProgress>) -> Vec<BatchProgress> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}

// ---------------------------------------------------------------------------
// Test: a failed batch is recorded and later batches still run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_batch_does_not_halt_the_run() {
    let store = FlakyStore::new(&[1], StoreError::Constraint("unique violation".into()));
    let executor = BatchCommitExecutor::new(&store, options(10));
    let plan = CommitPlan::insert_all(contact_records(30));

    let summary = executor
        .commit(
            Uuid::nil(),
            RecordKind::Contact,
            plan,
            &actor(),
            None,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(summary.total_planned, 30);
    assert_eq!(summary.total_attempted, 30);
    assert_eq!(summary.total_succeeded, 20);
    assert_eq!(summary.total_failed, 10);
    assert_eq!(summary.batches_succeeded, 2);
    assert_eq!(summary.batches_failed, 1);
    assert!(!summary.cancelled);
    assert_eq!(store.inner.len().await, 20);

    let failure = summary
        .log
        .iter()
        .find(|entry| entry.message.starts_with("Batch 2 failed"))
        .expect("failed batch is logged");
    assert!(failure.message.contains("rows 11-20"));
    assert!(failure.message.contains("unique violation"));
}

// ---------------------------------------------------------------------------
// Test: one progress update per batch, in batch order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn progress_is_emitted_after_every_batch() {
    let store = FlakyStore::new(&[1], StoreError::Other("boom".into()));
    let executor = BatchCommitExecutor::new(&store, options(10));
    let (tx, rx) = mpsc::channel(16);

    executor
        .commit(
            Uuid::nil(),
            RecordKind::Contact,
            CommitPlan::insert_all(contact_records(25)),
            &actor(),
            Some(&tx),
            &CancellationToken::new(),
        )
        .await;
    drop(tx);

    let updates = drain(rx);
    let indices: Vec<usize> = updates.iter().map(|u| u.result.batch_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    let processed: Vec<usize> = updates.iter().map(|u| u.processed).collect();
    assert_eq!(processed, vec![10, 20, 25]);

    let last = updates.last().unwrap();
    assert_eq!(last.total, 25);
    assert_eq!(last.succeeded, 15);
    assert_eq!(last.failed, 10);
    assert_eq!(last.percent(), 100);
    assert!(!updates[1].result.is_success());
}

// ---------------------------------------------------------------------------
// Test: failures are not retried by default
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_failure_is_not_retried_by_default() {
    let store = FlakyStore::new(&[0], StoreError::Unavailable("connection reset".into()));
    let executor = BatchCommitExecutor::new(&store, options(10));

    let summary = executor
        .commit(
            Uuid::nil(),
            RecordKind::Contact,
            CommitPlan::insert_all(contact_records(10)),
            &actor(),
            None,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(store.commit_calls(), 1);
    assert_eq!(summary.total_failed, 10);
    assert_eq!(summary.batches_failed, 1);
}

// ---------------------------------------------------------------------------
// Test: transient failures are retried when retries are enabled
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_failure_is_retried_when_enabled() {
    let store = FlakyStore::new(&[0, 1], StoreError::Timeout { elapsed_ms: 30_000 });
    let executor = BatchCommitExecutor::new(&store, retrying(10, 3));
    let (tx, rx) = mpsc::channel(4);

    let summary = executor
        .commit(
            Uuid::nil(),
            RecordKind::Contact,
            CommitPlan::insert_all(contact_records(10)),
            &actor(),
            Some(&tx),
            &CancellationToken::new(),
        )
        .await;
    drop(tx);

    assert_eq!(store.commit_calls(), 3);
    assert_eq!(summary.total_succeeded, 10);
    assert_eq!(summary.total_failed, 0);
    assert_eq!(drain(rx)[0].result.attempts, 3);
}

// ---------------------------------------------------------------------------
// Test: permanent failures are never retried
// ---------------------------------------------------------------------------

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let store = FlakyStore::new(&[0], StoreError::Unauthorized("token expired".into()));
    let executor = BatchCommitExecutor::new(&store, retrying(10, 3));

    let summary = executor
        .commit(
            Uuid::nil(),
            RecordKind::Contact,
            CommitPlan::insert_all(contact_records(10)),
            &actor(),
            None,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(store.commit_calls(), 1);
    assert_eq!(summary.total_failed, 10);
}

// ---------------------------------------------------------------------------
// Test: exhausted retries fail the batch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exhausted_retries_fail_the_batch() {
    let store = FlakyStore::new(&[0, 1, 2], StoreError::Unavailable("down".into()));
    let executor = BatchCommitExecutor::new(&store, retrying(10, 2));

    let summary = executor
        .commit(
            Uuid::nil(),
            RecordKind::Contact,
            CommitPlan::insert_all(contact_records(20)),
            &actor(),
            None,
            &CancellationToken::new(),
        )
        .await;

    // Batch 1 uses calls 0..=2 and fails; batch 2 succeeds on call 3.
    assert_eq!(store.commit_calls(), 4);
    assert_eq!(summary.total_succeeded, 10);
    assert_eq!(summary.total_failed, 10);
}

// ---------------------------------------------------------------------------
// Test: a token cancelled up front submits nothing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_before_start_submits_nothing() {
    let store = FlakyStore::reliable();
    let executor = BatchCommitExecutor::new(&store, options(10));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = executor
        .commit(
            Uuid::nil(),
            RecordKind::Contact,
            CommitPlan::insert_all(contact_records(30)),
            &actor(),
            None,
            &cancel,
        )
        .await;

    assert!(summary.cancelled);
    assert_eq!(store.commit_calls(), 0);
    assert_eq!(summary.total_attempted, 0);
    assert_eq!(summary.remaining(), 30);
    assert!(store.inner.is_empty().await);
}

// ---------------------------------------------------------------------------
// Test: cancelling during the inter-batch pause stops the run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_during_pause_stops_before_next_batch() {
    let store = FlakyStore::reliable();
    let executor = BatchCommitExecutor::new(
        &store,
        ExecutorOptions {
            batch_size: 10,
            inter_batch_delay: Duration::from_secs(30),
            ..ExecutorOptions::default()
        },
    );
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(4);
    let actor = actor();

    let (summary, _) = tokio::join!(
        executor.commit(
            Uuid::nil(),
            RecordKind::Contact,
            CommitPlan::insert_all(contact_records(30)),
            &actor,
            Some(&tx),
            &cancel,
        ),
        async {
            rx.recv().await;
            cancel.cancel();
        }
    );

    assert!(summary.cancelled);
    assert_eq!(summary.total_attempted, 10);
    assert_eq!(summary.total_succeeded, 10);
    assert_eq!(summary.total_attempted, summary.total_succeeded + summary.total_failed);
    assert!(summary.total_planned > summary.total_attempted + summary.total_skipped);
    assert_eq!(store.inner.len().await, 10);
}

// ---------------------------------------------------------------------------
// Test: update writes reach existing records
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_writes_modify_existing_records() {
    let store = FlakyStore::reliable();
    let existing_id = store
        .inner
        .seed(
            RecordKind::Contact,
            fields(&[("name", "Old Name"), ("email", "contact1@example.com")]),
            &actor(),
        )
        .await;

    let mut records = contact_records(2).into_iter();
    let first = records.next().unwrap();
    let second = records.next().unwrap();
    let plan = CommitPlan {
        writes: vec![
            RecordWrite::Update {
                existing_id,
                record: first,
                fields: fields(&[("name", "Contact 1")]),
            },
            RecordWrite::Insert { record: second },
        ],
        skipped: Vec::new(),
    };

    let executor = BatchCommitExecutor::new(&store, options(25));
    let summary = executor
        .commit(
            Uuid::nil(),
            RecordKind::Contact,
            plan,
            &actor(),
            None,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(summary.total_succeeded, 2);
    let stored = store.inner.records(RecordKind::Contact, &actor()).await;
    assert_eq!(stored.len(), 2);
    assert_eq!(
        stored[0].fields.get("name").map(String::as_str),
        Some("Contact 1")
    );
}

// ---------------------------------------------------------------------------
// Test: identical runs produce identical summaries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn identical_runs_are_deterministic() {
    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let store = FlakyStore::new(&[2], StoreError::Other("boom".into()));
        let executor = BatchCommitExecutor::new(&store, options(7));
        let summary = executor
            .commit(
                Uuid::nil(),
                RecordKind::Contact,
                CommitPlan::insert_all(contact_records(30)),
                &actor(),
                None,
                &CancellationToken::new(),
            )
            .await;
        let messages: Vec<String> = summary.log.iter().map(|e| e.message.clone()).collect();
        outcomes.push((
            summary.total_succeeded,
            summary.total_failed,
            summary.batches_failed,
            messages,
        ));
    }
    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[0].0, 23);
    assert_eq!(outcomes[0].1, 7);
}
