//! Non-interactive migration API: start a run, watch its progress, cancel
//! it, and collect the summary once it is finished.

use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use recordport_core::batching::MigrationSummary;
use recordport_core::error::CoreError;
use recordport_core::migration_state::MigrationState;
use recordport_core::store::RecordStore;
use recordport_core::tabular::ParseOptions;
use recordport_core::types::ActorContext;
use recordport_core::validation::ImportKind;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::executor::BatchProgress;
use crate::session::MigrationSession;

/// Progress updates buffered before the executor waits for the reader.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// A migration committing in the background.
#[derive(Debug)]
pub struct MigrationHandle {
    id: Uuid,
    progress: mpsc::Receiver<BatchProgress>,
    task: JoinHandle<Result<MigrationSummary, PipelineError>>,
    cancel: CancellationToken,
}

impl MigrationHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// One update per finished batch, in batch order. Ends when the commit
    /// task finishes.
    pub fn progress(&mut self) -> impl Stream<Item = BatchProgress> + '_ {
        futures::stream::poll_fn(move |cx| self.progress.poll_recv(cx))
    }

    pub async fn next_progress(&mut self) -> Option<BatchProgress> {
        self.progress.recv().await
    }

    /// Stop before the next batch. A batch already submitted still finishes.
    pub fn cancel(&self) {
        tracing::info!(migration_id = %self.id, "Migration cancellation requested");
        self.cancel.cancel();
    }

    /// Wait for the commit to finish and return its summary.
    ///
    /// Unread progress updates are discarded.
    pub async fn summary(self) -> Result<MigrationSummary, PipelineError> {
        drop(self.progress);
        self.task
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?
    }
}

/// Parse, validate and preview `bytes` synchronously, then commit in a
/// background task.
///
/// Parse failures, unmapped required fields and validation errors are
/// returned here, before anything is written. Validation errors are only
/// tolerated when [`PipelineConfig::exclude_invalid_rows`] is set.
pub async fn start_migration(
    store: Arc<dyn RecordStore>,
    actor: ActorContext,
    kind: ImportKind,
    bytes: &[u8],
    config: PipelineConfig,
) -> Result<MigrationHandle, PipelineError> {
    let exclude_invalid_rows = config.exclude_invalid_rows;
    let mut session = MigrationSession::new(kind, actor, config);
    let id = session.id();

    let errors = session.upload(bytes, &ParseOptions::default())?.errors.clone();

    let unmapped = session.unmapped_required_fields();
    if !unmapped.is_empty() {
        return Err(CoreError::MappingIncomplete { fields: unmapped }.into());
    }

    if !errors.is_empty() {
        if !exclude_invalid_rows {
            tracing::warn!(
                migration_id = %id,
                errors = errors.len(),
                "Migration rejected: validation errors",
            );
            return Err(PipelineError::ValidationFailed { errors });
        }
        session.exclude_invalid_rows()?;
    }

    while session.state() != MigrationState::Previewing {
        session.advance(store.as_ref()).await?;
    }

    let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    let task = tokio::spawn(async move {
        let summary = session.commit(store.as_ref(), Some(tx), task_cancel).await?;
        Ok::<_, PipelineError>(summary.clone())
    });

    tracing::info!(migration_id = %id, kind = %kind, "Migration started");

    Ok(MigrationHandle {
        id,
        progress: rx,
        task,
        cancel,
    })
}
