//! Sequential batch commit executor.
//!
//! Splits a [`CommitPlan`] into fixed-size batches and submits them to the
//! store one at a time. A failed batch is recorded and the run continues
//! with the next one. Progress is emitted on a channel after every batch,
//! and cancellation is honoured between batches only.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use recordport_core::batching::{partition, BatchResult, MigrationSummary, DEFAULT_BATCH_SIZE};
use recordport_core::duplicate_detection::{CommitPlan, RecordWrite};
use recordport_core::record::RecordKind;
use recordport_core::store::RecordStore;
use recordport_core::types::{ActorContext, RowIndex};

use crate::retry::{next_delay, RetryConfig};

/// Batch sizing, pacing and retry policy for one commit.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorOptions {
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    pub retry: RetryConfig,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            inter_batch_delay: Duration::ZERO,
            retry: RetryConfig::default(),
        }
    }
}

/// Progress update sent after each batch completes.
#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub migration_id: Uuid,
    pub result: BatchResult,
    /// Records attempted so far, across all batches.
    pub processed: usize,
    /// Records that will be attempted if the run is not cancelled.
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    pub records_per_second: f64,
}

impl BatchProgress {
    /// Completion percentage in `0..=100`.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.processed * 100) / self.total).min(100) as u8
    }
}

pub struct BatchCommitExecutor<'a> {
    store: &'a dyn RecordStore,
    options: ExecutorOptions,
}

impl<'a> BatchCommitExecutor<'a> {
    pub fn new(store: &'a dyn RecordStore, options: ExecutorOptions) -> Self {
        Self { store, options }
    }

    /// Commit every write of `plan` in order and return the final summary.
    ///
    /// Never fails as a whole: store errors are recorded per batch.
    pub async fn commit(
        &self,
        migration_id: Uuid,
        kind: RecordKind,
        plan: CommitPlan,
        actor: &ActorContext,
        progress: Option<&mpsc::Sender<BatchProgress>>,
        cancel: &CancellationToken,
    ) -> MigrationSummary {
        let started = Instant::now();
        let total = plan.writes.len();
        let mut summary = MigrationSummary::new(plan.total_planned(), plan.skipped.len());

        let batches = partition(plan.writes, self.options.batch_size);
        let batch_count = batches.len();
        tracing::info!(
            migration_id = %migration_id,
            kind = %kind,
            total,
            skipped = plan.skipped.len(),
            batch_count,
            batch_size = self.options.batch_size,
            "Starting batch commit",
        );

        for (batch_index, batch) in batches.into_iter().enumerate() {
            if cancel.is_cancelled() || (batch_index > 0 && self.pause(cancel).await) {
                summary.mark_cancelled();
                tracing::info!(
                    migration_id = %migration_id,
                    batch_index,
                    remaining = summary.remaining(),
                    "Batch commit cancelled",
                );
                break;
            }

            let result = self
                .commit_one(migration_id, kind, batch_index, &batch, actor, cancel)
                .await;
            summary.record_batch(&result);

            let elapsed = started.elapsed();
            let update = BatchProgress {
                migration_id,
                result,
                processed: summary.total_attempted,
                total,
                succeeded: summary.total_succeeded,
                failed: summary.total_failed,
                elapsed_ms: elapsed.as_millis() as u64,
                records_per_second: throughput(summary.total_attempted, elapsed),
            };
            if let Some(tx) = progress {
                if tx.send(update).await.is_err() {
                    tracing::debug!(migration_id = %migration_id, "Progress receiver dropped");
                }
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            migration_id = %migration_id,
            attempted = summary.total_attempted,
            succeeded = summary.total_succeeded,
            failed = summary.total_failed,
            skipped = summary.total_skipped,
            cancelled = summary.cancelled,
            elapsed_ms = summary.elapsed_ms,
            "Batch commit finished",
        );
        summary
    }

    /// Wait out the inter-batch delay. Returns `true` if cancelled meanwhile.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        if self.options.inter_batch_delay.is_zero() {
            return false;
        }
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(self.options.inter_batch_delay) => false,
        }
    }

    /// Submit one batch, retrying transient failures per the retry policy.
    async fn commit_one(
        &self,
        migration_id: Uuid,
        kind: RecordKind,
        batch_index: usize,
        batch: &[RecordWrite],
        actor: &ActorContext,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let retry = &self.options.retry;
        let mut delay = retry.initial_delay;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let err = match self.store.commit_batch(kind, batch, actor).await {
                Ok(()) => {
                    tracing::info!(
                        migration_id = %migration_id,
                        batch_index,
                        succeeded = batch.len(),
                        attempts,
                        "Batch committed",
                    );
                    return BatchResult::success(batch_index, batch.len(), attempts);
                }
                Err(err) => err,
            };

            if err.is_transient() && attempts <= retry.max_retries {
                tracing::warn!(
                    migration_id = %migration_id,
                    batch_index,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient batch failure, retrying",
                );
                let cancelled = tokio::select! {
                    _ = cancel.cancelled() => true,
                    _ = tokio::time::sleep(delay) => false,
                };
                if !cancelled {
                    delay = next_delay(delay, retry);
                    continue;
                }
            }

            let rows: Vec<RowIndex> = batch.iter().map(RecordWrite::row_index).collect();
            tracing::warn!(
                migration_id = %migration_id,
                batch_index,
                rows = ?rows,
                attempts,
                error = %err,
                "Batch failed",
            );
            return BatchResult::failure(batch_index, &rows, &err.to_string(), attempts);
        }
    }
}

fn throughput(records: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        records as f64 / secs
    } else {
        0.0
    }
}
