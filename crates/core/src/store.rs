//! Record store collaborator.
//!
//! The pipeline never talks to a database directly; it calls a
//! [`RecordStore`]. Every call is scoped by the caller's [`ActorContext`].

use async_trait::async_trait;

use crate::duplicate_detection::{ExistingRecordSummary, RecordWrite};
use crate::record::{RecordFields, RecordKind};
use crate::types::{ActorContext, DbId};

/// Failure reported by a store call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Store call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Not found: {kind} {id}")]
    NotFound { kind: RecordKind, id: DbId },

    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Failures that may succeed if the same call is repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

/// Persistent home of committed records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert new records; returns their ids in input order.
    async fn insert(
        &self,
        kind: RecordKind,
        records: &[RecordFields],
        actor: &ActorContext,
    ) -> Result<Vec<DbId>, StoreError>;

    /// Write `fields` onto the existing record `id`.
    async fn update(
        &self,
        kind: RecordKind,
        id: DbId,
        fields: &RecordFields,
        actor: &ActorContext,
    ) -> Result<(), StoreError>;

    /// Existing records whose identity is one of `identities` (normalized).
    async fn query_by_identity(
        &self,
        kind: RecordKind,
        identities: &[String],
        actor: &ActorContext,
    ) -> Result<Vec<ExistingRecordSummary>, StoreError>;

    /// Apply one batch of writes.
    ///
    /// Implementations backed by a transactional store override this so the
    /// batch commits or fails as a unit. The default issues the writes one
    /// by one and stops at the first error.
    async fn commit_batch(
        &self,
        kind: RecordKind,
        writes: &[RecordWrite],
        actor: &ActorContext,
    ) -> Result<(), StoreError> {
        let inserts: Vec<RecordFields> = writes
            .iter()
            .filter(|w| matches!(w, RecordWrite::Insert { .. }))
            .map(RecordWrite::payload)
            .collect();
        if !inserts.is_empty() {
            self.insert(kind, &inserts, actor).await?;
        }
        for write in writes {
            if let RecordWrite::Update {
                existing_id, fields, ..
            } = write
            {
                self.update(kind, *existing_id, fields, actor).await?;
            }
        }
        Ok(())
    }
}
